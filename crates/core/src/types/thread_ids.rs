use serde::{Deserialize, Serialize};

/// One or many source thread identifiers for a platform.
///
/// The manifest may list a single id as a bare string; both shapes
/// normalize to the same ordered list so equality ignores the spelling.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "ThreadIdsRepr", into = "ThreadIdsRepr")]
pub struct ThreadIds(Vec<String>);

impl ThreadIds {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out: Vec<String> = Vec::new();
        for id in ids {
            let id = id.into().trim().to_string();
            if !id.is_empty() && !out.contains(&id) {
                out.push(id);
            }
        }
        Self(out)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ThreadIdsRepr {
    One(String),
    Many(Vec<String>),
}

impl From<ThreadIdsRepr> for ThreadIds {
    fn from(value: ThreadIdsRepr) -> Self {
        match value {
            ThreadIdsRepr::One(id) => ThreadIds::new([id]),
            ThreadIdsRepr::Many(ids) => ThreadIds::new(ids),
        }
    }
}

impl From<ThreadIds> for ThreadIdsRepr {
    fn from(value: ThreadIds) -> Self {
        ThreadIdsRepr::Many(value.0)
    }
}
