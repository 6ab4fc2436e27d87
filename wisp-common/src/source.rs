use std::{
    fs::File,
    io::Read,
    path::{Path, PathBuf},
    rc::Rc,
};

/// Some literal source text, whether typed at a REPL prompt, read from a
/// file, or handed to `Context::exec` directly. Sources without a path
/// point at `./source`.
#[derive(Debug, PartialEq, Eq)]
pub struct Source {
    pub contents: String,
    pub path: PathBuf,
}

impl Source {
    /// Build a `Source` from an in-memory string and a path. Does not
    /// check that `path`, if it exists on disk, actually contains
    /// `source` — use `Source::path` to read a source from disk.
    pub fn new(source: &str, path: &Path) -> Rc<Source> {
        Rc::new(Source {
            contents: source.to_string(),
            path: path.to_owned(),
        })
    }

    /// Read a file from disk into a `Source`.
    pub fn path(path: &Path) -> std::io::Result<Rc<Source>> {
        let mut source = String::new();
        let mut file = File::open(path)?;
        file.read_to_string(&mut source)?;
        Ok(Source::new(&source, path))
    }

    /// Wrap a string as a `Source` with no backing file.
    pub fn source(source: &str) -> Rc<Source> {
        Source::new(source, &PathBuf::from("./source"))
    }
}
