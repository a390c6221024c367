//! Showing a picked picture at full size.
//!
//! The gallery only reports what was clicked; a host decides what to do with it.
//! The demo hands picked items to a [`Lightbox`], which on the desktop opens the
//! image in the default viewer and on the web opens it in a new tab.

use std::path::Path;

use crate::{
    error::{GalleryError, Result},
    options::NodeData,
};

pub trait Lightbox {
    fn show(&mut self, url: &str) -> Result<()>;
}

/// Opens pictures with whatever the platform uses for URLs.
#[derive(Debug, Clone)]
pub struct SystemLightbox {
    root: String,
}

impl SystemLightbox {
    /// `asset_root` is what item URLs are relative to.
    pub fn new(asset_root: &Path) -> Self {
        Self {
            root: asset_root.to_string_lossy().into_owned(),
        }
    }
}

impl Lightbox for SystemLightbox {
    #[cfg(not(target_arch = "wasm32"))]
    fn show(&mut self, url: &str) -> Result<()> {
        let target = resolve(&self.root, url);
        log::info!("opening {target}");
        webbrowser::open(&target).map_err(|e| GalleryError::fetch(url, e))
    }

    #[cfg(target_arch = "wasm32")]
    fn show(&mut self, url: &str) -> Result<()> {
        let target = resolve(&self.root, url);
        let window = web_sys::window().ok_or_else(|| GalleryError::fetch(url, "no window"))?;
        window
            .open_with_url_and_target(&target, "_blank")
            .map(|_| ())
            .map_err(|e| GalleryError::fetch(url, format!("{e:?}")))
    }
}

/// Show the picture of a picked item. Other entities are only logged.
pub fn show_picked(lightbox: &mut dyn Lightbox, data: &NodeData) {
    match data {
        NodeData::Item(item) => {
            if let Err(e) = lightbox.show(&item.url) {
                log::error!("{e}");
            }
        }
        NodeData::Entity { id } => log::info!("picked {id}"),
    }
}

/// Where an item URL points once the asset root is taken into account. Absolute
/// URLs and data URIs are left alone.
pub fn resolve(root: &str, url: &str) -> String {
    if url.contains("://") || url.starts_with("data:") {
        return url.to_string();
    }
    let relative = url.trim_start_matches('/');
    #[cfg(not(target_arch = "wasm32"))]
    {
        let path = Path::new(root).join(relative);
        let absolute = std::fs::canonicalize(&path).unwrap_or(path);
        format!("file://{}", absolute.to_string_lossy())
    }
    #[cfg(target_arch = "wasm32")]
    {
        let root = root.trim_start_matches("./").trim_matches('/');
        if root.is_empty() {
            format!("/{relative}")
        } else {
            format!("/{root}/{relative}")
        }
    }
}
