use std::{
    collections::HashMap,
    io,
    path::{Component, Path, PathBuf},
    rc::Rc,
};

use futures::{
    future::{self, LocalBoxFuture},
    FutureExt,
};
use parse_display::Display;


/// A place static resources can be fetched from by path.
///
/// Paths are relative to the source; a leading `/` is ignored.
pub trait StaticSource {
    fn fetch(&self, path: &str) -> LocalBoxFuture<'static, Result<Vec<u8>, FetchError>>;
}

impl<F> StaticSource for F
where
    F: Fn(&str) -> LocalBoxFuture<'static, Result<Vec<u8>, FetchError>>,
{
    fn fetch(&self, path: &str) -> LocalBoxFuture<'static, Result<Vec<u8>, FetchError>> {
        self(path)
    }
}

#[derive(Display, Debug)]
pub enum FetchError {
    #[display("`{0}` not found")]
    NotFound(String),
    #[display("{0}")]
    Io(io::Error),
    #[display("resource unavailable: {0}")]
    Unavailable(String),
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchError::Io(e) => Some(e),
            FetchError::NotFound(_) | FetchError::Unavailable(_) => None,
        }
    }
}

/// Serves files below a root directory.
///
/// The file is read when the returned future is first polled.
#[derive(Clone, Debug)]
pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, FetchError> {
        let relative = Path::new(path.trim_start_matches('/'));
        let is_contained = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !is_contained || relative.as_os_str().is_empty() {
            return Err(FetchError::NotFound(path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

impl StaticSource for DirSource {
    fn fetch(&self, path: &str) -> LocalBoxFuture<'static, Result<Vec<u8>, FetchError>> {
        let file = match self.resolve(path) {
            Ok(file) => file,
            Err(e) => return future::ready(Err(e)).boxed_local(),
        };
        let path = path.to_string();
        async move {
            std::fs::read(&file).map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => FetchError::NotFound(path),
                _ => FetchError::Io(e),
            })
        }
        .boxed_local()
    }
}

/// Serves byte buffers registered in memory.
#[derive(Clone, Debug, Default)]
pub struct MemorySource {
    entries: HashMap<String, Rc<[u8]>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with(mut self, path: &str, body: impl AsRef<[u8]>) -> Self {
        self.insert(path, body);
        self
    }
    pub fn insert(&mut self, path: &str, body: impl AsRef<[u8]>) {
        self.entries
            .insert(normalize(path).to_string(), Rc::from(body.as_ref()));
    }
}

impl StaticSource for MemorySource {
    fn fetch(&self, path: &str) -> LocalBoxFuture<'static, Result<Vec<u8>, FetchError>> {
        let result = match self.entries.get(normalize(path)) {
            Some(body) => Ok(body.to_vec()),
            None => Err(FetchError::NotFound(path.to_string())),
        };
        future::ready(result).boxed_local()
    }
}

fn normalize(path: &str) -> &str {
    path.trim_start_matches('/')
}
