use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use anyhow::anyhow;
use rocket::serde::Serialize;
use crate::model::{Gym, GymSource, SourceType};
use crate::sources::ScrapedEntry;

pub const MINDBODY_CLASS_ID_ATTR: &str = "data-hc-mbo-class-id";
pub const ZEN_CLASS_ID_ATTR: &str = "appointmentId";

/// Identifies one scheduled class occurrence: a source class id is only unique within its gym.
#[derive(Serialize, Clone, PartialEq, Eq, Hash, Debug)]
pub struct IdentityKey {
    pub gym: Gym,
    pub class_id: String,
}
impl IdentityKey {
    pub fn new(gym: Gym, class_id: impl Into<String>) -> Self {
        Self { gym, class_id: class_id.into() }
    }
}
impl Display for IdentityKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.gym.code(), self.class_id)
    }
}

pub fn default_class_id_attr(source: SourceType) -> &'static str {
    match source {
        SourceType::MindBody => MINDBODY_CLASS_ID_ATTR,
        SourceType::Zen => ZEN_CLASS_ID_ATTR,
    }
}

/// Per-gym lookup of the attribute that carries the class id.
#[derive(Clone, Debug)]
pub struct ClassIdSelector {
    by_gym: HashMap<Gym, String>,
}
impl ClassIdSelector {
    pub fn new(sources: &[GymSource]) -> Self {
        let by_gym = sources.iter()
            .map(|src| {
                let attr = src.class_id_attr.clone()
                    .unwrap_or_else(|| default_class_id_attr(src.source).to_string());
                (src.gym, attr)
            })
            .collect();
        Self { by_gym }
    }
    pub fn attribute(&self, gym: Gym) -> Option<&str> {
        self.by_gym.get(&gym).map(String::as_str)
    }
    pub fn identity(&self, entry: &ScrapedEntry) -> anyhow::Result<IdentityKey> {
        let attr = self.attribute(entry.gym)
            .ok_or_else(|| anyhow!("No schedule source configured for gym {}", entry.gym))?;
        let class_id = entry.attrs.get(attr)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow!("Class '{}' at {} has no '{attr}' attribute", entry.name, entry.gym))?;
        Ok(IdentityKey::new(entry.gym, class_id))
    }
}
