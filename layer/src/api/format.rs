//! Backend-neutral texel formats.

macro_rules! define_formats {
    ($($(#[$meta:meta])* $name:ident,)*) => {
        /// Texel format of a resource or view.
        ///
        /// `*Typeless` formats describe storage only; views pick the
        /// interpretation.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub enum Format {
            $($(#[$meta])* $name,)*
        }

        impl Format {
            /// Every format, in declaration order.
            pub const ALL: &'static [Format] = &[$(Format::$name,)*];
        }
    };
}

define_formats! {
    #[default]
    Unknown,

    R8Typeless,
    R8Uint,
    R8Sint,
    R8Unorm,
    R8Snorm,
    R8G8Typeless,
    R8G8Uint,
    R8G8Sint,
    R8G8Unorm,
    R8G8Snorm,
    R8G8B8A8Typeless,
    R8G8B8A8Uint,
    R8G8B8A8Sint,
    R8G8B8A8Unorm,
    R8G8B8A8UnormSrgb,
    R8G8B8A8Snorm,
    B8G8R8A8Typeless,
    B8G8R8A8Unorm,
    B8G8R8A8UnormSrgb,
    R10G10B10A2Typeless,
    R10G10B10A2Uint,
    R10G10B10A2Unorm,
    B10G10R10A2Typeless,
    B10G10R10A2Uint,
    B10G10R10A2Unorm,

    R16Typeless,
    R16Float,
    R16Uint,
    R16Sint,
    R16Unorm,
    R16Snorm,
    R16G16Typeless,
    R16G16Float,
    R16G16Uint,
    R16G16Sint,
    R16G16Unorm,
    R16G16Snorm,
    R16G16B16A16Typeless,
    R16G16B16A16Float,
    R16G16B16A16Uint,
    R16G16B16A16Sint,
    R16G16B16A16Unorm,
    R16G16B16A16Snorm,

    R32Typeless,
    R32Float,
    R32Uint,
    R32Sint,
    R32G32Typeless,
    R32G32Float,
    R32G32Uint,
    R32G32Sint,
    R32G32B32Typeless,
    R32G32B32Float,
    R32G32B32Uint,
    R32G32B32Sint,
    R32G32B32A32Typeless,
    R32G32B32A32Float,
    R32G32B32A32Uint,
    R32G32B32A32Sint,

    R9G9B9E5,
    R11G11B10Float,
    B5G6R5Unorm,
    B5G5R5A1Unorm,
    B4G4R4A4Unorm,

    S8Uint,
    D16Unorm,
    D16UnormS8Uint,
    D24UnormS8Uint,
    D32Float,
    D32FloatS8Uint,

    BC1Typeless,
    BC1Unorm,
    BC1UnormSrgb,
    BC2Typeless,
    BC2Unorm,
    BC2UnormSrgb,
    BC3Typeless,
    BC3Unorm,
    BC3UnormSrgb,
    BC4Typeless,
    BC4Unorm,
    BC4Snorm,
    BC5Typeless,
    BC5Unorm,
    BC5Snorm,
    BC6HTypeless,
    BC6HUfloat,
    BC6HSfloat,
    BC7Typeless,
    BC7Unorm,
    BC7UnormSrgb,
}

impl Format {
    /// Returns `true` for depth and/or stencil formats.
    pub fn is_depth_stencil(self) -> bool {
        matches!(
            self,
            Self::S8Uint
                | Self::D16Unorm
                | Self::D16UnormS8Uint
                | Self::D24UnormS8Uint
                | Self::D32Float
                | Self::D32FloatS8Uint
        )
    }

    /// Returns `true` if the format has a depth component.
    pub fn has_depth(self) -> bool {
        self.is_depth_stencil() && self != Self::S8Uint
    }

    /// Returns `true` if the format has a stencil component.
    pub fn has_stencil(self) -> bool {
        matches!(
            self,
            Self::S8Uint | Self::D16UnormS8Uint | Self::D24UnormS8Uint | Self::D32FloatS8Uint
        )
    }

    /// Returns `true` for block-compressed formats.
    pub fn is_compressed(self) -> bool {
        self.block_extent() > 1
    }

    /// Returns `true` for sRGB-encoded formats.
    pub fn is_srgb(self) -> bool {
        matches!(
            self,
            Self::R8G8B8A8UnormSrgb
                | Self::B8G8R8A8UnormSrgb
                | Self::BC1UnormSrgb
                | Self::BC2UnormSrgb
                | Self::BC3UnormSrgb
                | Self::BC7UnormSrgb
        )
    }

    /// Returns `true` for storage-only formats.
    pub fn is_typeless(self) -> bool {
        self.to_typeless() == self && self != Self::Unknown && !self.is_depth_stencil()
            && !matches!(
                self,
                Self::R9G9B9E5
                    | Self::R11G11B10Float
                    | Self::B5G6R5Unorm
                    | Self::B5G5R5A1Unorm
                    | Self::B4G4R4A4Unorm
            )
    }

    /// The storage-only format sharing this format's bit layout.
    pub fn to_typeless(self) -> Format {
        use Format::*;
        match self {
            R8Uint | R8Sint | R8Unorm | R8Snorm => R8Typeless,
            R8G8Uint | R8G8Sint | R8G8Unorm | R8G8Snorm => R8G8Typeless,
            R8G8B8A8Uint | R8G8B8A8Sint | R8G8B8A8Unorm | R8G8B8A8UnormSrgb | R8G8B8A8Snorm => {
                R8G8B8A8Typeless
            }
            B8G8R8A8Unorm | B8G8R8A8UnormSrgb => B8G8R8A8Typeless,
            R10G10B10A2Uint | R10G10B10A2Unorm => R10G10B10A2Typeless,
            B10G10R10A2Uint | B10G10R10A2Unorm => B10G10R10A2Typeless,
            R16Float | R16Uint | R16Sint | R16Unorm | R16Snorm => R16Typeless,
            R16G16Float | R16G16Uint | R16G16Sint | R16G16Unorm | R16G16Snorm => R16G16Typeless,
            R16G16B16A16Float | R16G16B16A16Uint | R16G16B16A16Sint | R16G16B16A16Unorm
            | R16G16B16A16Snorm => R16G16B16A16Typeless,
            R32Float | R32Uint | R32Sint => R32Typeless,
            R32G32Float | R32G32Uint | R32G32Sint => R32G32Typeless,
            R32G32B32Float | R32G32B32Uint | R32G32B32Sint => R32G32B32Typeless,
            R32G32B32A32Float | R32G32B32A32Uint | R32G32B32A32Sint => R32G32B32A32Typeless,
            BC1Unorm | BC1UnormSrgb => BC1Typeless,
            BC2Unorm | BC2UnormSrgb => BC2Typeless,
            BC3Unorm | BC3UnormSrgb => BC3Typeless,
            BC4Unorm | BC4Snorm => BC4Typeless,
            BC5Unorm | BC5Snorm => BC5Typeless,
            BC6HUfloat | BC6HSfloat => BC6HTypeless,
            BC7Unorm | BC7UnormSrgb => BC7Typeless,
            other => other,
        }
    }

    /// The sRGB counterpart of a UNORM format, or the format itself.
    pub fn to_srgb(self) -> Format {
        use Format::*;
        match self {
            R8G8B8A8Typeless | R8G8B8A8Unorm => R8G8B8A8UnormSrgb,
            B8G8R8A8Typeless | B8G8R8A8Unorm => B8G8R8A8UnormSrgb,
            BC1Typeless | BC1Unorm => BC1UnormSrgb,
            BC2Typeless | BC2Unorm => BC2UnormSrgb,
            BC3Typeless | BC3Unorm => BC3UnormSrgb,
            BC7Typeless | BC7Unorm => BC7UnormSrgb,
            other => other,
        }
    }

    /// The linear counterpart of an sRGB format, or the format itself.
    pub fn to_linear(self) -> Format {
        use Format::*;
        match self {
            R8G8B8A8Typeless | R8G8B8A8UnormSrgb => R8G8B8A8Unorm,
            B8G8R8A8Typeless | B8G8R8A8UnormSrgb => B8G8R8A8Unorm,
            BC1Typeless | BC1UnormSrgb => BC1Unorm,
            BC2Typeless | BC2UnormSrgb => BC2Unorm,
            BC3Typeless | BC3UnormSrgb => BC3Unorm,
            BC7Typeless | BC7UnormSrgb => BC7Unorm,
            other => other,
        }
    }

    /// Width and height in texels of one block (1 for uncompressed formats).
    pub fn block_extent(self) -> u32 {
        use Format::*;
        match self {
            BC1Typeless | BC1Unorm | BC1UnormSrgb | BC2Typeless | BC2Unorm | BC2UnormSrgb
            | BC3Typeless | BC3Unorm | BC3UnormSrgb | BC4Typeless | BC4Unorm | BC4Snorm
            | BC5Typeless | BC5Unorm | BC5Snorm | BC6HTypeless | BC6HUfloat | BC6HSfloat
            | BC7Typeless | BC7Unorm | BC7UnormSrgb => 4,
            _ => 1,
        }
    }

    /// Size in bytes of one texel (or one block for compressed formats).
    pub fn block_size(self) -> u32 {
        use Format::*;
        match self {
            Unknown => 0,
            R8Typeless | R8Uint | R8Sint | R8Unorm | R8Snorm | S8Uint => 1,
            R8G8Typeless | R8G8Uint | R8G8Sint | R8G8Unorm | R8G8Snorm | R16Typeless
            | R16Float | R16Uint | R16Sint | R16Unorm | R16Snorm | B5G6R5Unorm
            | B5G5R5A1Unorm | B4G4R4A4Unorm | D16Unorm => 2,
            D16UnormS8Uint => 3,
            R8G8B8A8Typeless | R8G8B8A8Uint | R8G8B8A8Sint | R8G8B8A8Unorm
            | R8G8B8A8UnormSrgb | R8G8B8A8Snorm | B8G8R8A8Typeless | B8G8R8A8Unorm
            | B8G8R8A8UnormSrgb | R10G10B10A2Typeless | R10G10B10A2Uint | R10G10B10A2Unorm
            | B10G10R10A2Typeless | B10G10R10A2Uint | B10G10R10A2Unorm | R16G16Typeless
            | R16G16Float | R16G16Uint | R16G16Sint | R16G16Unorm | R16G16Snorm
            | R32Typeless | R32Float | R32Uint | R32Sint | R9G9B9E5 | R11G11B10Float
            | D24UnormS8Uint | D32Float => 4,
            D32FloatS8Uint => 5,
            R16G16B16A16Typeless | R16G16B16A16Float | R16G16B16A16Uint | R16G16B16A16Sint
            | R16G16B16A16Unorm | R16G16B16A16Snorm | R32G32Typeless | R32G32Float
            | R32G32Uint | R32G32Sint => 8,
            R32G32B32Typeless | R32G32B32Float | R32G32B32Uint | R32G32B32Sint => 12,
            R32G32B32A32Typeless | R32G32B32A32Float | R32G32B32A32Uint | R32G32B32A32Sint => 16,
            BC1Typeless | BC1Unorm | BC1UnormSrgb | BC4Typeless | BC4Unorm | BC4Snorm => 8,
            BC2Typeless | BC2Unorm | BC2UnormSrgb | BC3Typeless | BC3Unorm | BC3UnormSrgb
            | BC5Typeless | BC5Unorm | BC5Snorm | BC6HTypeless | BC6HUfloat | BC6HSfloat
            | BC7Typeless | BC7Unorm | BC7UnormSrgb => 16,
        }
    }

    /// Tightly packed size in bytes of one row of `width` texels.
    pub fn row_pitch(self, width: u32) -> u32 {
        let block = self.block_extent();
        width.div_ceil(block) * self.block_size()
    }

    /// Tightly packed size in bytes of one `width`x`height` slice.
    pub fn slice_pitch(self, width: u32, height: u32) -> u32 {
        self.row_pitch(width) * height.div_ceil(self.block_extent())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typeless_family() {
        assert_eq!(Format::R8G8B8A8UnormSrgb.to_typeless(), Format::R8G8B8A8Typeless);
        assert_eq!(Format::R32Float.to_typeless(), Format::R32Typeless);
        assert!(Format::R16G16Typeless.is_typeless());
        assert!(!Format::R16G16Float.is_typeless());
        assert!(!Format::D32Float.is_typeless());
        assert!(!Format::Unknown.is_typeless());
    }

    #[test]
    fn test_srgb_pairs() {
        assert_eq!(Format::B8G8R8A8Unorm.to_srgb(), Format::B8G8R8A8UnormSrgb);
        assert_eq!(Format::B8G8R8A8UnormSrgb.to_linear(), Format::B8G8R8A8Unorm);
        assert_eq!(Format::R16G16B16A16Float.to_srgb(), Format::R16G16B16A16Float);
        assert!(Format::BC7UnormSrgb.is_srgb());
    }

    #[test]
    fn test_depth_stencil_classification() {
        assert!(Format::D24UnormS8Uint.has_depth());
        assert!(Format::D24UnormS8Uint.has_stencil());
        assert!(!Format::S8Uint.has_depth());
        assert!(!Format::D32Float.has_stencil());
        assert!(!Format::R32Float.is_depth_stencil());
    }

    #[test]
    fn test_pitches() {
        assert_eq!(Format::R8G8B8A8Unorm.row_pitch(256), 1024);
        assert_eq!(Format::R8G8B8A8Unorm.slice_pitch(256, 256), 256 * 1024);
        // 4x4 blocks of 8 bytes, partial blocks round up.
        assert_eq!(Format::BC1Unorm.row_pitch(10), 3 * 8);
        assert_eq!(Format::BC1Unorm.slice_pitch(10, 10), 3 * 8 * 3);
    }

    #[test]
    fn test_every_known_format_has_a_size() {
        for &format in Format::ALL {
            if format != Format::Unknown {
                assert!(format.block_size() > 0, "{format:?}");
            }
        }
    }
}
