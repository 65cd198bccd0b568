//! # Texture and Skybox Store
//!
//! Textures keep their pixel payload as `image::DynamicImage`, one slot per
//! cube-map side. A texture has to be allocated (size, format, flags) before
//! data can be uploaded; uploads are converted to the allocated format.
//!
//! Viewports own a render-target texture each. Those textures are created and
//! freed with their viewport and cannot be freed on their own.

use bitflags::bitflags;
use image::{imageops::FilterType, ColorType, DynamicImage};

use crate::error::{ServerError, ServerResult};
use crate::resources::handle::{ResourceKind, Rid};
use crate::server::RenderServer;

bitflags! {
    /// Texture sampling and storage flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureFlags: u32 {
        /// Generate mipmaps when available
        const MIPMAPS = 1;
        /// Tile instead of clamping
        const REPEAT = 2;
        /// Linear filtering
        const FILTER = 4;
        /// Anisotropic filtering
        const ANISOTROPIC_FILTER = 8;
        /// Convert from sRGB on sampling
        const CONVERT_TO_LINEAR = 16;
        /// Tile with alternate sections mirrored
        const MIRRORED_REPEAT = 32;
        /// Six-sided cube map
        const CUBEMAP = 2048;
        /// Data is streamed every frame
        const USED_FOR_STREAMING = 4096;
        /// Repeat, mipmaps and filter
        const DEFAULT = Self::REPEAT.bits() | Self::MIPMAPS.bits() | Self::FILTER.bits();
    }
}

impl Default for TextureFlags {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Storage format of a texture's pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PixelFormat {
    /// 8-bit luminance
    L8,
    /// 8-bit luminance and alpha
    La8,
    /// 8-bit RGB
    Rgb8,
    /// 8-bit RGBA
    #[default]
    Rgba8,
    /// 32-bit float RGB
    Rgb32F,
    /// 32-bit float RGBA
    Rgba32F,
}

impl PixelFormat {
    /// Bytes used by one pixel
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::L8 => 1,
            Self::La8 => 2,
            Self::Rgb8 => 3,
            Self::Rgba8 => 4,
            Self::Rgb32F => 12,
            Self::Rgba32F => 16,
        }
    }

    /// Closest storage format for a decoded image
    pub fn from_color_type(color: ColorType) -> Self {
        match color {
            ColorType::L8 | ColorType::L16 => Self::L8,
            ColorType::La8 | ColorType::La16 => Self::La8,
            ColorType::Rgb8 | ColorType::Rgb16 => Self::Rgb8,
            ColorType::Rgb32F => Self::Rgb32F,
            ColorType::Rgba32F => Self::Rgba32F,
            _ => Self::Rgba8,
        }
    }

    /// Convert an image into this format
    pub fn convert(self, image: &DynamicImage) -> DynamicImage {
        match self {
            Self::L8 => DynamicImage::ImageLuma8(image.to_luma8()),
            Self::La8 => DynamicImage::ImageLumaA8(image.to_luma_alpha8()),
            Self::Rgb8 => DynamicImage::ImageRgb8(image.to_rgb8()),
            Self::Rgba8 => DynamicImage::ImageRgba8(image.to_rgba8()),
            Self::Rgb32F => DynamicImage::ImageRgb32F(image.to_rgb32f()),
            Self::Rgba32F => DynamicImage::ImageRgba32F(image.to_rgba32f()),
        }
    }
}

/// Side of a cube map; plain textures only use [`CubeMapSide::Left`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CubeMapSide {
    /// First side, and the only side of a 2D texture
    #[default]
    Left,
    /// Right side
    Right,
    /// Bottom side
    Bottom,
    /// Top side
    Top,
    /// Front side
    Front,
    /// Back side
    Back,
}

impl CubeMapSide {
    /// Slot index of the side
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Texture record
#[derive(Debug, Clone, Default)]
pub struct Texture {
    /// Width in pixels (0 until allocated)
    pub width: u32,
    /// Height in pixels (0 until allocated)
    pub height: u32,
    /// Storage format
    pub format: PixelFormat,
    /// Sampling flags
    pub flags: TextureFlags,
    /// Whether `texture_allocate` has run
    pub allocated: bool,
    /// Size the backend should use instead of the data size
    pub size_override: Option<(u32, u32)>,
    /// Source path, informational only
    pub path: String,
    pub(crate) sides: [Option<DynamicImage>; 6],
    /// Size requested by `texture_allocate`; uploads always scale from it
    pub(crate) alloc_width: u32,
    pub(crate) alloc_height: u32,
    /// Viewport owning this texture as its render target
    pub(crate) owner: Rid,
}

impl Texture {
    /// Estimated storage in bytes, counting every side and the mip chain
    pub fn byte_size(&self) -> usize {
        let sides = if self.flags.contains(TextureFlags::CUBEMAP) { 6 } else { 1 };
        let base = self.width as usize * self.height as usize * self.format.bytes_per_pixel() * sides;
        if self.flags.contains(TextureFlags::MIPMAPS) {
            base + base / 3
        } else {
            base
        }
    }

    fn check_side(&self, side: CubeMapSide) -> ServerResult<()> {
        if side != CubeMapSide::Left && !self.flags.contains(TextureFlags::CUBEMAP) {
            return Err(ServerError::invalid_state(format!(
                "cube map side {side:?} used on a texture without the CUBEMAP flag"
            )));
        }
        Ok(())
    }
}

/// One line of [`RenderServer::texture_debug_usage`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureInfo {
    /// Texture handle
    pub texture: Rid,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Storage format
    pub format: PixelFormat,
    /// Estimated bytes
    pub bytes: usize,
    /// Source path
    pub path: String,
}

/// Sky cube-map binding
#[derive(Debug, Clone, Default)]
pub struct Skybox {
    /// Cube-map texture
    pub cube_map: Rid,
    /// Radiance map edge size
    pub radiance_size: u32,
}

impl RenderServer {
    /// Create an unallocated texture
    pub fn texture_create(&mut self) -> Rid {
        let rid = self.allocate(ResourceKind::Texture);
        self.textures.insert(rid, Texture::default());
        rid
    }

    /// Create, allocate and fill a texture from an image
    pub fn texture_create_from_image(&mut self, image: &DynamicImage, flags: TextureFlags) -> ServerResult<Rid> {
        let rid = self.texture_create();
        let format = PixelFormat::from_color_type(image.color());
        self.texture_allocate(rid, image.width(), image.height(), format, flags)?;
        self.texture_set_data(rid, image, CubeMapSide::Left)?;
        Ok(rid)
    }

    /// Set size, format and flags; previously uploaded data is dropped
    pub fn texture_allocate(
        &mut self,
        texture: Rid,
        width: u32,
        height: u32,
        format: PixelFormat,
        flags: TextureFlags,
    ) -> ServerResult<()> {
        if width == 0 || height == 0 {
            return Err(ServerError::invalid_state(format!("cannot allocate a {width}x{height} texture")));
        }
        let record = self.textures.get_mut(texture)?;
        record.width = width;
        record.height = height;
        record.alloc_width = width;
        record.alloc_height = height;
        record.format = format;
        record.flags = flags;
        record.allocated = true;
        record.sides = Default::default();
        log::trace!("Allocated texture {texture} {width}x{height} {format:?}");
        self.mark_resources_dirty();
        Ok(())
    }

    /// Upload an image to one side of an allocated texture
    ///
    /// The image is converted to the texture's format and resized to the
    /// allocated dimensions. With shrink-x2 enabled the stored image and the
    /// reported size are half the allocated size, however often data is set.
    pub fn texture_set_data(&mut self, texture: Rid, image: &DynamicImage, side: CubeMapSide) -> ServerResult<()> {
        let shrink = self.texture_shrink_x2;
        let record = self.textures.get_mut(texture)?;
        if !record.allocated {
            return Err(ServerError::invalid_state(format!("texture {texture} has not been allocated")));
        }
        record.check_side(side)?;

        let (w, h) = if shrink {
            ((record.alloc_width / 2).max(1), (record.alloc_height / 2).max(1))
        } else {
            (record.alloc_width, record.alloc_height)
        };
        let mut data = record.format.convert(image);
        if data.width() != w || data.height() != h {
            data = data.resize_exact(w, h, FilterType::Triangle);
        }
        record.width = w;
        record.height = h;
        record.sides[side.index()] = Some(data);
        self.mark_resources_dirty();
        Ok(())
    }

    /// Copy of the image stored on one side, `None` when nothing was uploaded
    pub fn texture_get_data(&self, texture: Rid, side: CubeMapSide) -> ServerResult<Option<DynamicImage>> {
        let record = self.textures.get(texture)?;
        if record.check_side(side).is_err() {
            return Ok(None);
        }
        Ok(record.sides[side.index()].clone())
    }

    /// Replace the flag set; the CUBEMAP bit is fixed at allocation
    pub fn texture_set_flags(&mut self, texture: Rid, flags: TextureFlags) -> ServerResult<()> {
        let record = self.textures.get_mut(texture)?;
        let cubemap = record.flags & TextureFlags::CUBEMAP;
        record.flags = (flags - TextureFlags::CUBEMAP) | cubemap;
        self.mark_resources_dirty();
        Ok(())
    }

    /// Current flag set
    pub fn texture_get_flags(&self, texture: Rid) -> ServerResult<TextureFlags> {
        Ok(self.textures.get(texture)?.flags)
    }

    /// Storage format
    pub fn texture_get_format(&self, texture: Rid) -> ServerResult<PixelFormat> {
        Ok(self.textures.get(texture)?.format)
    }

    /// Width in pixels
    pub fn texture_get_width(&self, texture: Rid) -> ServerResult<u32> {
        Ok(self.textures.get(texture)?.width)
    }

    /// Height in pixels
    pub fn texture_get_height(&self, texture: Rid) -> ServerResult<u32> {
        Ok(self.textures.get(texture)?.height)
    }

    /// Override the size the backend samples at
    pub fn texture_set_size_override(&mut self, texture: Rid, width: u32, height: u32) -> ServerResult<()> {
        let record = self.textures.get_mut(texture)?;
        if !record.allocated {
            return Err(ServerError::invalid_state(format!("texture {texture} has not been allocated")));
        }
        if width == 0 || height == 0 {
            return Err(ServerError::invalid_state("size override must be non-zero"));
        }
        record.size_override = Some((width, height));
        self.mark_resources_dirty();
        Ok(())
    }

    /// Set the informational source path
    pub fn texture_set_path(&mut self, texture: Rid, path: impl Into<String>) -> ServerResult<()> {
        self.textures.get_mut(texture)?.path = path.into();
        Ok(())
    }

    /// Informational source path
    pub fn texture_get_path(&self, texture: Rid) -> ServerResult<String> {
        Ok(self.textures.get(texture)?.path.clone())
    }

    /// Halve every image uploaded from now on
    pub fn texture_set_shrink_all_x2_on_set_data(&mut self, enable: bool) {
        self.texture_shrink_x2 = enable;
    }

    /// Per-texture memory report in creation order
    pub fn texture_debug_usage(&self) -> Vec<TextureInfo> {
        self.registry
            .handles_of_kind(ResourceKind::Texture)
            .into_iter()
            .filter_map(|rid| {
                self.textures.resolve(rid).map(|t| TextureInfo {
                    texture: rid,
                    width: t.width,
                    height: t.height,
                    format: t.format,
                    bytes: t.byte_size(),
                    path: t.path.clone(),
                })
            })
            .collect()
    }

    /// Create an empty skybox
    pub fn skybox_create(&mut self) -> Rid {
        let rid = self.allocate(ResourceKind::Skybox);
        self.skyboxes.insert(rid, Skybox::default());
        rid
    }

    /// Bind a cube-map texture; the empty handle unbinds
    pub fn skybox_set_texture(&mut self, skybox: Rid, cube_map: Rid, radiance_size: u32) -> ServerResult<()> {
        self.skyboxes.get(skybox)?;
        if !cube_map.is_empty() {
            let texture = self.textures.get(cube_map)?;
            if !texture.flags.contains(TextureFlags::CUBEMAP) {
                return Err(ServerError::invalid_state(format!("texture {cube_map} is not a cube map")));
            }
        }
        let record = self.skyboxes.get_mut(skybox)?;
        record.cube_map = cube_map;
        record.radiance_size = radiance_size;
        self.mark_resources_dirty();
        Ok(())
    }

    /// Skybox record
    pub fn skybox(&self, skybox: Rid) -> ServerResult<&Skybox> {
        self.skyboxes.get(skybox)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ServerConfig;
    use image::RgbaImage;

    fn server() -> RenderServer {
        RenderServer::headless(ServerConfig::default())
    }

    fn image(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, image::Rgba([10, 20, 30, 255])))
    }

    #[test]
    fn test_flags_default_and_immediate_visibility() {
        let mut vs = server();
        let tex = vs.texture_create();

        assert_eq!(vs.texture_get_flags(tex), Ok(TextureFlags::REPEAT | TextureFlags::MIPMAPS | TextureFlags::FILTER));
        vs.texture_set_flags(tex, TextureFlags::FILTER).expect("flags");
        assert_eq!(vs.texture_get_flags(tex), Ok(TextureFlags::FILTER));
    }

    #[test]
    fn test_set_data_requires_allocation() {
        let mut vs = server();
        let tex = vs.texture_create();
        assert!(matches!(
            vs.texture_set_data(tex, &image(4, 4), CubeMapSide::Left),
            Err(ServerError::InvalidState(_))
        ));
    }

    #[test]
    fn test_cube_sides_require_cubemap_flag() {
        let mut vs = server();
        let tex = vs.texture_create();
        vs.texture_allocate(tex, 4, 4, PixelFormat::Rgba8, TextureFlags::DEFAULT).expect("allocate");

        assert!(vs.texture_set_data(tex, &image(4, 4), CubeMapSide::Top).is_err());
        assert_eq!(vs.texture_get_data(tex, CubeMapSide::Top), Ok(None));

        let cube = vs.texture_create();
        vs.texture_allocate(cube, 4, 4, PixelFormat::Rgba8, TextureFlags::CUBEMAP).expect("allocate");
        vs.texture_set_data(cube, &image(4, 4), CubeMapSide::Top).expect("top side");
        assert!(vs.texture_get_data(cube, CubeMapSide::Top).expect("data").is_some());
    }

    #[test]
    fn test_create_from_image_and_shrink() {
        let mut vs = server();
        let tex = vs.texture_create_from_image(&image(8, 4), TextureFlags::DEFAULT).expect("create");
        assert_eq!(vs.texture_get_width(tex), Ok(8));
        assert_eq!(vs.texture_get_format(tex), Ok(PixelFormat::Rgba8));

        vs.texture_set_shrink_all_x2_on_set_data(true);
        vs.texture_set_data(tex, &image(8, 4), CubeMapSide::Left).expect("data");
        assert_eq!(vs.texture_get_width(tex), Ok(4));
        assert_eq!(vs.texture_get_height(tex), Ok(2));
    }

    #[test]
    fn test_shrink_scales_from_allocated_size() {
        let mut vs = server();
        vs.texture_set_shrink_all_x2_on_set_data(true);
        let tex = vs.texture_create();
        vs.texture_allocate(tex, 64, 64, PixelFormat::Rgba8, TextureFlags::DEFAULT).expect("allocate");

        for _ in 0..3 {
            vs.texture_set_data(tex, &image(64, 64), CubeMapSide::Left).expect("data");
        }
        assert_eq!(vs.texture_get_width(tex), Ok(32));
        assert_eq!(vs.texture_get_height(tex), Ok(32));
        let stored = vs.texture_get_data(tex, CubeMapSide::Left).expect("data").expect("uploaded");
        assert_eq!((stored.width(), stored.height()), (32, 32));
    }

    #[test]
    fn test_shrink_keeps_cube_sides_consistent() {
        let mut vs = server();
        vs.texture_set_shrink_all_x2_on_set_data(true);
        let cube = vs.texture_create();
        vs.texture_allocate(cube, 64, 64, PixelFormat::Rgba8, TextureFlags::CUBEMAP).expect("allocate");

        let sides = [CubeMapSide::Left, CubeMapSide::Right, CubeMapSide::Bottom, CubeMapSide::Top];
        for side in sides {
            vs.texture_set_data(cube, &image(64, 64), side).expect("side");
        }
        assert_eq!(vs.texture_get_width(cube), Ok(32));
        for side in sides {
            let stored = vs.texture_get_data(cube, side).expect("data").expect("uploaded");
            assert_eq!((stored.width(), stored.height()), (32, 32), "{side:?}");
        }
    }

    #[test]
    fn test_disabling_shrink_restores_allocated_size() {
        let mut vs = server();
        let tex = vs.texture_create();
        vs.texture_allocate(tex, 16, 8, PixelFormat::Rgba8, TextureFlags::DEFAULT).expect("allocate");
        vs.texture_set_shrink_all_x2_on_set_data(true);
        vs.texture_set_data(tex, &image(16, 8), CubeMapSide::Left).expect("data");
        assert_eq!(vs.texture_get_width(tex), Ok(8));

        vs.texture_set_shrink_all_x2_on_set_data(false);
        vs.texture_set_data(tex, &image(16, 8), CubeMapSide::Left).expect("data");
        assert_eq!(vs.texture_get_width(tex), Ok(16));
        assert_eq!(vs.texture_get_height(tex), Ok(8));
    }

    #[test]
    fn test_debug_usage_reports_bytes() {
        let mut vs = server();
        let tex = vs.texture_create();
        vs.texture_allocate(tex, 4, 4, PixelFormat::Rgba8, TextureFlags::FILTER).expect("allocate");
        vs.texture_set_path(tex, "res://a.png").expect("path");

        let usage = vs.texture_debug_usage();
        let info = usage.iter().find(|info| info.texture == tex).expect("listed");
        assert_eq!(info.bytes, 64);
        assert_eq!(info.path, "res://a.png");
    }

    #[test]
    fn test_skybox_needs_cubemap() {
        let mut vs = server();
        let flat = vs.texture_create();
        vs.texture_allocate(flat, 4, 4, PixelFormat::Rgba8, TextureFlags::DEFAULT).expect("allocate");
        let sky = vs.skybox_create();

        assert!(vs.skybox_set_texture(sky, flat, 128).is_err());
        assert!(vs.skybox_set_texture(sky, Rid::empty(), 0).is_ok());
    }
}
