//! Script-normalization adapter backed by `zhconv`.
//!
//! Converts Chinese text to a target variant (Traditional by default) using
//! zhconv's rulesets, which include phrase-level mappings.

use antisc_core::{errors::Error, ports::ScriptConverter, Result};
use zhconv::{zhconv, Variant};

#[derive(Clone, Copy, Debug)]
pub struct ZhconvConverter {
    target: Variant,
}

impl ZhconvConverter {
    pub fn new(target: Variant) -> Self {
        Self { target }
    }

    /// Parse a BCP 47-ish tag such as `zh-Hant` or `zh-TW`.
    pub fn from_tag(tag: &str) -> Result<Self> {
        let target = tag
            .trim()
            .parse::<Variant>()
            .map_err(|_| Error::Config(format!("unsupported conversion target: {tag:?}")))?;
        Ok(Self::new(target))
    }

    pub fn traditional() -> Self {
        Self::new(Variant::ZhHant)
    }
}

impl ScriptConverter for ZhconvConverter {
    fn convert(&self, text: &str) -> Result<String> {
        Ok(zhconv(text, self.target))
    }
}
