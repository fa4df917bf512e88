use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::collections::BTreeMap;
use tunejit_config::CompileOptions;
use tunejit_tuner::{KnobConfig, KnobSet, KnobValue, TunerError};

/// Key for identifying one specialization of a function.
///
/// Knobs are named rather than numbered, so a key written by one process
/// means the same thing to the next.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpecializationKey {
    pub function_name: String,
    pub knobs: BTreeMap<String, KnobValue>,
    pub options: CompileOptions,
}

impl SpecializationKey {
    /// Key for `config` as resolved against the knob set it was built for.
    pub fn new<M: ?Sized>(
        function_name: impl Into<String>,
        knobs: &KnobSet<M>,
        config: &KnobConfig,
        options: CompileOptions,
    ) -> Result<Self, TunerError> {
        Ok(Self {
            function_name: function_name.into(),
            knobs: knobs.named_values(config)?,
            options,
        })
    }

    /// Hex SHA-1 of the key. Stable across processes and builds, unlike the
    /// in-memory hash.
    pub fn digest(&self) -> String {
        let mut hasher = Sha1::new();
        hasher.update(self.function_name.as_bytes());
        hasher.update([0]);
        // maps of strings to plain enums always serialize
        if let Ok(knobs) = serde_json::to_vec(&self.knobs) {
            hasher.update(knobs);
        }
        hasher.update([0]);
        hasher.update(self.options.opt_level.name().as_bytes());
        hasher.update([u8::from(self.options.fast_isel), u8::from(self.options.ipra)]);
        format!("{:x}", hasher.finalize())
    }

    /// Stem shared by the files that persist this key.
    pub fn file_stem(&self) -> String {
        self.digest()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tunejit_config::CodegenOptLevel;
    use tunejit_tuner::ScalarKnob;

    fn toggles(names: &[&str]) -> KnobSet<()> {
        let mut knobs = KnobSet::new();
        for name in names {
            knobs
                .add_int(ScalarKnob::new(*name, 0, 0, 1, |_, _| {}))
                .unwrap();
        }
        knobs
    }

    fn key_for(knobs: &KnobSet<()>, on: &str, options: CompileOptions) -> SpecializationKey {
        let mut builder = KnobConfig::builder();
        for knob in knobs.int_knobs() {
            builder = builder.int(knob.id(), i64::from(knob.name() == on));
        }
        SpecializationKey::new("kernel", knobs, &builder.build(), options).unwrap()
    }

    #[test]
    fn test_key_depends_on_config_and_options() {
        let knobs = toggles(&["optsize", "noinline"]);
        let key = key_for(&knobs, "optsize", CompileOptions::default());
        let same = key_for(&knobs, "optsize", CompileOptions::default());
        assert_eq!(key.digest(), same.digest());

        let by_config = key_for(&knobs, "noinline", CompileOptions::default());
        assert_ne!(key, by_config);
        assert_ne!(key.digest(), by_config.digest());

        let by_options = key_for(
            &knobs,
            "optsize",
            CompileOptions::with_opt_level(CodegenOptLevel::None),
        );
        assert_ne!(key, by_options);
        assert_ne!(key.digest(), by_options.digest());
        assert_eq!(key.file_stem().len(), 40);
    }

    #[test]
    fn test_key_follows_names_not_ids() {
        let first = toggles(&["optsize", "noinline"]);
        let second = toggles(&["noinline", "optsize"]);

        let key = key_for(&first, "optsize", CompileOptions::default());
        assert_eq!(key, key_for(&second, "optsize", CompileOptions::default()));
        assert_eq!(
            key.file_stem(),
            key_for(&second, "optsize", CompileOptions::default()).file_stem()
        );
        assert_ne!(
            key.file_stem(),
            key_for(&second, "noinline", CompileOptions::default()).file_stem()
        );
    }

    #[test]
    fn test_foreign_config_is_rejected() {
        let first = toggles(&["optsize"]);
        let second = toggles(&["optsize"]);
        let id = second.find("optsize").unwrap();
        let config = KnobConfig::builder().int(id, 1).build();
        let key = SpecializationKey::new("kernel", &first, &config, CompileOptions::default());
        assert!(key.is_err());
    }
}
