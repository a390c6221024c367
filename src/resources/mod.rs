//! Loading models and pictures from external files.
//!
//! - [`AssetFormat`] picks a loader from a URL's extension
//! - [`AssetSource`] fetches bytes: from the asset directory on native targets,
//!   from the page's origin on the web
//! - [`AssetLoaders`] is the loader set a gallery owns, with a cache of what it
//!   already parsed
//!
//! Every loader turns its file into a standalone [`LoadedModel`] which the gallery
//! grafts into its own scene graph.

pub mod animation;
pub mod fbx_model;
pub mod gltf_model;
pub mod obj_model;
pub mod picture;

use std::{cell::RefCell, collections::HashMap, path::PathBuf, rc::Rc, sync::Arc};

use image::RgbaImage;

use crate::{
    data_structures::scene_graph::SceneGraph,
    error::{GalleryError, Result},
    resources::animation::AnimationClip,
};

/// Native reads are split into chunks of this size so progress can be reported.
#[cfg(not(target_arch = "wasm32"))]
const READ_CHUNK: usize = 1 << 20;

/// Model file formats, chosen by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetFormat {
    Gltf,
    Obj,
    Fbx,
}

impl AssetFormat {
    pub fn from_url(url: &str) -> Result<Self> {
        let path = strip_query(url);
        let extension = path
            .rsplit('/')
            .next()
            .and_then(|file| file.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase());
        match extension.as_deref() {
            Some("gltf") | Some("glb") => Ok(Self::Gltf),
            Some("obj") => Ok(Self::Obj),
            Some("fbx") => Ok(Self::Fbx),
            _ => Err(GalleryError::UnsupportedFormat {
                url: url.to_string(),
            }),
        }
    }
}

/// Bytes received so far for one file. `total` is unknown when the server does not say.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadProgress {
    pub url: String,
    pub loaded: u64,
    pub total: Option<u64>,
}

pub type ProgressFn = Box<dyn FnMut(LoadProgress)>;

/// A parsed model, not yet part of any gallery.
#[derive(Debug, Clone)]
pub struct LoadedModel {
    pub graph: SceneGraph,
    /// Clips target nodes of `graph`.
    pub animations: Vec<AnimationClip>,
}

/// Where asset bytes come from.
#[derive(Debug, Clone)]
pub struct AssetSource {
    root: PathBuf,
}

impl AssetSource {
    /// On native targets `root` is a directory; on the web it is a path below the page's origin.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    pub async fn load_string(
        &self,
        url: &str,
        progress: &mut dyn FnMut(LoadProgress),
    ) -> Result<String> {
        let bytes = self.load_binary(url, progress).await?;
        String::from_utf8(bytes).map_err(|e| GalleryError::parse(url, e))
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub async fn load_binary(
        &self,
        url: &str,
        progress: &mut dyn FnMut(LoadProgress),
    ) -> Result<Vec<u8>> {
        use tokio::io::AsyncReadExt;

        if let Some(data) = decode_data_uri(url)? {
            return Ok(data);
        }
        if url.contains("://") {
            return Err(GalleryError::fetch(
                url,
                "only local assets can be read natively",
            ));
        }
        let path = self.root.join(strip_query(url).trim_start_matches('/'));
        let mut file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| GalleryError::fetch(url, e))?;
        let total = file.metadata().await.ok().map(|m| m.len());
        let mut data = Vec::with_capacity(total.unwrap_or(0) as usize);
        let mut chunk = vec![0u8; READ_CHUNK];
        loop {
            let read = file
                .read(&mut chunk)
                .await
                .map_err(|e| GalleryError::fetch(url, e))?;
            if read == 0 {
                break;
            }
            data.extend_from_slice(&chunk[..read]);
            progress(LoadProgress {
                url: url.to_string(),
                loaded: data.len() as u64,
                total,
            });
        }
        Ok(data)
    }

    #[cfg(target_arch = "wasm32")]
    pub async fn load_binary(
        &self,
        url: &str,
        progress: &mut dyn FnMut(LoadProgress),
    ) -> Result<Vec<u8>> {
        if let Some(data) = decode_data_uri(url)? {
            return Ok(data);
        }
        let target = self.format_url(url)?;
        let response = reqwest::get(target)
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| GalleryError::fetch(url, e))?;
        let total = response.content_length();
        let data = response
            .bytes()
            .await
            .map_err(|e| GalleryError::fetch(url, e))?
            .to_vec();
        progress(LoadProgress {
            url: url.to_string(),
            loaded: data.len() as u64,
            total: total.or(Some(data.len() as u64)),
        });
        Ok(data)
    }

    #[cfg(target_arch = "wasm32")]
    fn format_url(&self, file_name: &str) -> Result<reqwest::Url> {
        if let Ok(absolute) = reqwest::Url::parse(file_name) {
            return Ok(absolute);
        }
        let origin = web_sys::window()
            .and_then(|w| w.location().origin().ok())
            .ok_or_else(|| GalleryError::fetch(file_name, "page has no origin"))?;
        let root = self.root.to_string_lossy();
        let root = root.trim_start_matches("./").trim_matches('/');
        let base = if root.is_empty() {
            format!("{origin}/")
        } else {
            format!("{origin}/{root}/")
        };
        reqwest::Url::parse(&base)
            .and_then(|b| b.join(file_name.trim_start_matches('/')))
            .map_err(|e| GalleryError::fetch(file_name, e))
    }
}

/// The loader set of one gallery. Shared by `Rc` between the gallery and its
/// in-flight loads, never between galleries.
#[derive(Debug)]
pub struct AssetLoaders {
    source: AssetSource,
    models: RefCell<HashMap<String, Rc<LoadedModel>>>,
    pictures: RefCell<HashMap<String, Arc<RgbaImage>>>,
}

impl AssetLoaders {
    pub fn new(source: AssetSource) -> Self {
        Self {
            source,
            models: RefCell::new(HashMap::new()),
            pictures: RefCell::new(HashMap::new()),
        }
    }

    pub fn source(&self) -> &AssetSource {
        &self.source
    }

    /// Load and parse a model with the loader its extension asks for.
    pub async fn load_model(
        &self,
        url: &str,
        progress: &mut dyn FnMut(LoadProgress),
    ) -> Result<Rc<LoadedModel>> {
        let format = AssetFormat::from_url(url)?;
        if let Some(model) = self.models.borrow().get(url) {
            return Ok(model.clone());
        }
        log::debug!("loading {format:?} model {url}");
        let model = match format {
            AssetFormat::Gltf => gltf_model::load_model_gltf(&self.source, url, progress).await?,
            AssetFormat::Obj => obj_model::load_model_obj(&self.source, url, progress).await?,
            AssetFormat::Fbx => fbx_model::load_model_fbx(&self.source, url, progress).await?,
        };
        log::debug!("loaded {url}: {} nodes, {} clips", model.graph.len(), model.animations.len());
        let model = Rc::new(model);
        self.models.borrow_mut().insert(url.to_string(), model.clone());
        Ok(model)
    }

    pub async fn load_picture(&self, url: &str) -> Result<Arc<RgbaImage>> {
        if let Some(picture) = self.pictures.borrow().get(url) {
            return Ok(picture.clone());
        }
        let picture = Arc::new(picture::load_picture(&self.source, url, &mut |_| {}).await?);
        self.pictures.borrow_mut().insert(url.to_string(), picture.clone());
        Ok(picture)
    }
}

/// `url` without its query string and fragment.
pub fn strip_query(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    &url[..end]
}

/// Resolve `reference` as found inside the file at `base`: data URIs and absolute
/// URLs stay as they are, everything else is relative to `base`'s directory.
pub fn resolve_relative(base: &str, reference: &str) -> String {
    if reference.starts_with("data:") || reference.contains("://") {
        return reference.to_string();
    }
    let base = strip_query(base);
    let mut segments: Vec<&str> = match base.rfind('/') {
        Some(slash) => base[..slash].split('/').collect(),
        None => Vec::new(),
    };
    for segment in reference.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.retain(|s| !s.is_empty() && *s != ".");
    segments.join("/")
}

/// Decodes `data:[<mime>][;base64],<data>` URIs. `Ok(None)` for anything else.
pub fn decode_data_uri(uri: &str) -> Result<Option<Vec<u8>>> {
    use base64::Engine;

    let Some(rest) = uri.strip_prefix("data:") else {
        return Ok(None);
    };
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| GalleryError::parse("data uri", "missing `,`"))?;
    if meta.ends_with(";base64") {
        base64::engine::general_purpose::STANDARD
            .decode(payload)
            .map(Some)
            .map_err(|e| GalleryError::parse("data uri", e))
    } else {
        Ok(Some(payload.as_bytes().to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_follows_the_extension() {
        assert_eq!(
            AssetFormat::from_url("room1/msg.gltf").unwrap(),
            AssetFormat::Gltf
        );
        assert_eq!(
            AssetFormat::from_url("robot/robot.GLB?v=3").unwrap(),
            AssetFormat::Gltf
        );
        assert_eq!(
            AssetFormat::from_url("rooms/hall.obj#top").unwrap(),
            AssetFormat::Obj
        );
        assert_eq!(
            AssetFormat::from_url("people/walk.fbx").unwrap(),
            AssetFormat::Fbx
        );
    }

    #[test]
    fn unknown_extensions_are_rejected() {
        for url in ["rooms/hall.blend", "rooms/hall", "rooms.v2/hall", "hall.gltf.zip"] {
            assert_eq!(
                AssetFormat::from_url(url),
                Err(GalleryError::UnsupportedFormat { url: url.to_string() })
            );
        }
    }

    #[test]
    fn references_resolve_next_to_their_file() {
        assert_eq!(
            resolve_relative("room1/msg.gltf", "msg.bin"),
            "room1/msg.bin"
        );
        assert_eq!(
            resolve_relative("room1/msg.gltf?v=2", "./tex/wall.jpg"),
            "room1/tex/wall.jpg"
        );
        assert_eq!(resolve_relative("a/b/c.obj", "../c.mtl"), "a/c.mtl");
        assert_eq!(resolve_relative("c.obj", "c.mtl"), "c.mtl");
        assert_eq!(
            resolve_relative("a/c.gltf", "https://cdn.example/x.bin"),
            "https://cdn.example/x.bin"
        );
    }

    #[test]
    fn data_uris_decode() {
        assert_eq!(
            decode_data_uri("data:application/octet-stream;base64,AAEC").unwrap(),
            Some(vec![0, 1, 2])
        );
        assert_eq!(decode_data_uri("data:,hi").unwrap(), Some(b"hi".to_vec()));
        assert_eq!(decode_data_uri("msg.bin").unwrap(), None);
        assert!(decode_data_uri("data:;base64,@@").is_err());
    }

    #[tokio::test]
    async fn native_reads_report_progress() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.bin"), vec![7u8; 1000]).unwrap();
        let source = AssetSource::new(dir.path());

        let mut seen = Vec::new();
        let data = source
            .load_binary("a.bin", &mut |p| seen.push(p))
            .await
            .unwrap();
        assert_eq!(data.len(), 1000);
        let last = seen.last().unwrap();
        assert_eq!((last.loaded, last.total), (1000, Some(1000)));

        assert!(matches!(
            source.load_binary("missing.bin", &mut |_| {}).await,
            Err(GalleryError::Fetch { .. })
        ));
    }
}
