//! The world-defs set: feature flags (`_Irr`, `_Sun`, `_LDR`, ...) gating
//! optional shader code. Iteration follows insertion order so generated text
//! is reproducible.

use indexmap::IndexSet;

use super::settings::RenderPathSettings;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorldDefs {
    defs: IndexSet<String>,
}

impl WorldDefs {
    pub fn new<I, S>(defs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            defs: defs.into_iter().map(Into::into).collect(),
        }
    }

    /// Defs listed in the configuration plus the ones implied by settings.
    pub fn from_config(listed: &[String], rp: &RenderPathSettings) -> Self {
        let mut defs = Self::new(listed.iter().cloned());
        if rp.ss_refraction {
            defs.add("_SSRefraction");
        }
        if rp.voxelgi_refract {
            defs.add("_VoxelRefract");
        }
        defs
    }

    pub fn has(&self, def: &str) -> bool {
        self.defs.contains(def)
    }

    pub fn add(&mut self, def: &str) {
        if !self.defs.contains(def) {
            self.defs.insert(def.to_string());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.defs.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Defs concatenated without separator, the form the build tool keys
    /// compiled shader variants by.
    pub fn joined(&self) -> String {
        self.defs.iter().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_insertion_order_and_dedups() {
        let mut defs = WorldDefs::new(["_Sun", "_Irr"]);
        defs.add("_Rad");
        defs.add("_Sun");
        assert_eq!(defs.iter().collect::<Vec<_>>(), ["_Sun", "_Irr", "_Rad"]);
        assert_eq!(defs.joined(), "_Sun_Irr_Rad");
    }

    #[test]
    fn settings_imply_refraction_defs() {
        let rp = RenderPathSettings {
            ss_refraction: true,
            ..RenderPathSettings::default()
        };
        let defs = WorldDefs::from_config(&[], &rp);
        assert!(defs.has("_SSRefraction"));
        assert!(!defs.has("_VoxelRefract"));
    }
}
