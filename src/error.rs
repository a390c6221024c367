//! Error type shared by the gallery, its loaders and the host shell.

use thiserror::Error;

/// Everything that can go wrong while setting up a gallery or loading into it.
///
/// Frame-time failures are logged and swallowed by [`crate::gallery::Gallery::frame`];
/// this type is what load handles and constructors surface to the caller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GalleryError {
    #[error("container `{0}` does not exist")]
    MissingContainer(String),

    #[error("container has no drawable area ({width}x{height})")]
    InvalidContainer { width: u32, height: u32 },

    #[error("no loader for `{url}` (expected .gltf, .glb, .obj or .fbx)")]
    UnsupportedFormat { url: String },

    #[error("failed to fetch `{url}`: {reason}")]
    Fetch { url: String, reason: String },

    #[error("failed to parse `{url}`: {reason}")]
    Parse { url: String, reason: String },

    #[error("load of `{0}` was cancelled")]
    Cancelled(String),

    #[error("gpu error: {0}")]
    Gpu(String),
}

impl GalleryError {
    pub(crate) fn fetch(url: &str, reason: impl std::fmt::Display) -> Self {
        Self::Fetch {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn parse(url: &str, reason: impl std::fmt::Display) -> Self {
        Self::Parse {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, GalleryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_asset() {
        let err = GalleryError::UnsupportedFormat {
            url: "rooms/hall.blend".into(),
        };
        assert!(err.to_string().contains("rooms/hall.blend"));

        let err = GalleryError::fetch("pictures/1.jpg", "404 Not Found");
        assert_eq!(
            err.to_string(),
            "failed to fetch `pictures/1.jpg`: 404 Not Found"
        );
    }
}
