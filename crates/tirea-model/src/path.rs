//! Printable access paths.
//!
//! A [`Seg`] identifies one access step and is the edge key of the
//! subscription tree, so a field read and a key read of the same name land on
//! the same node. A [`Path`] renders as `$.todos[0].title` in logs and errors.

use std::fmt;

/// Identity of one access step.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Seg {
    /// Field or map key: `.key`.
    Key(String),
    /// List position: `[3]`.
    Index(usize),
    /// Method call on the receiver: `.push()`.
    Call(&'static str),
}

impl Seg {
    pub fn key(k: impl Into<String>) -> Self {
        Seg::Key(k.into())
    }
}

impl fmt::Display for Seg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Seg::Key(k) => write!(f, ".{k}"),
            Seg::Index(i) => write!(f, "[{i}]"),
            Seg::Call(m) => write!(f, ".{m}()"),
        }
    }
}

impl From<&str> for Seg {
    fn from(key: &str) -> Self {
        Seg::Key(key.to_owned())
    }
}

impl From<String> for Seg {
    fn from(key: String) -> Self {
        Seg::Key(key)
    }
}

impl From<usize> for Seg {
    fn from(i: usize) -> Self {
        Seg::Index(i)
    }
}

/// Location relative to the state root.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Path(Vec<Seg>);

impl Path {
    /// The state root, `$`.
    pub fn root() -> Self {
        Self::default()
    }

    /// This path extended by one step.
    pub fn child(&self, seg: Seg) -> Self {
        let mut out = self.clone();
        out.push(seg);
        out
    }

    pub fn push(&mut self, seg: Seg) {
        self.0.push(seg);
    }

    /// `self` followed by `rest`. Used to re-root errors raised below a
    /// known location.
    pub fn join(&self, rest: &Path) -> Path {
        self.0.iter().chain(&rest.0).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("$")?;
        self.0.iter().try_for_each(|seg| fmt::Display::fmt(seg, f))
    }
}

impl FromIterator<Seg> for Path {
    fn from_iter<I: IntoIterator<Item = Seg>>(iter: I) -> Self {
        Path(iter.into_iter().collect())
    }
}

impl From<Seg> for Path {
    fn from(seg: Seg) -> Self {
        Path(vec![seg])
    }
}

/// Build a [`Path`] from keys and indices.
///
/// ```
/// use tirea_model::path;
///
/// assert_eq!(path!("todos", 0usize, "title").to_string(), "$.todos[0].title");
/// assert_eq!(path!().to_string(), "$");
/// ```
#[macro_export]
macro_rules! path {
    () => {
        $crate::Path::root()
    };
    ($($seg:expr),+ $(,)?) => {
        [$($crate::Seg::from($seg)),+].into_iter().collect::<$crate::Path>()
    };
}
