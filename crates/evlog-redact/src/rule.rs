//! Length-based masking rules.
//!
//! A rule `threshold:left*right` applies to values of at least `threshold`
//! characters, keeping `left` leading and `right` trailing characters and
//! replacing the rest with `*`. Rules are tried in configured order and the
//! first applicable one wins. Lengths count Unicode scalar values, not bytes.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;

use crate::error::{RedactionError, Result};

/// Mask emitted when no rule applies.
pub const GENERIC_MASK: &str = "****";

/// Largest value accepted for any rule component.
const MAX_RULE_VALUE: usize = 100;

static DEFAULT_RULES: Lazy<MaskingRules> = Lazy::new(|| {
    MaskingRules::new(vec![
        MaskingRule::new(12, 4, 4),
        MaskingRule::new(11, 3, 4),
        MaskingRule::new(7, 2, 2),
        MaskingRule::new(3, 1, 1),
        MaskingRule::new(2, 1, 0),
    ])
});

/// A single `(threshold, keep_left, keep_right)` rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskingRule {
    pub threshold: usize,
    pub keep_left: usize,
    pub keep_right: usize,
}

impl MaskingRule {
    pub const fn new(threshold: usize, keep_left: usize, keep_right: usize) -> Self {
        MaskingRule {
            threshold,
            keep_left,
            keep_right,
        }
    }

    /// Apply this rule to a value already split into chars.
    fn apply(&self, chars: &[char]) -> String {
        let len = chars.len();
        let mut out = String::with_capacity(len);
        if self.keep_left > 0 && self.keep_left < len {
            out.extend(&chars[..self.keep_left]);
        }
        let stars = len.saturating_sub(self.keep_left + self.keep_right);
        out.extend(std::iter::repeat('*').take(stars));
        if self.keep_right > 0 && self.keep_right < len {
            out.extend(&chars[len - self.keep_right..]);
        }
        out
    }
}

impl FromStr for MaskingRule {
    type Err = RedactionError;

    fn from_str(s: &str) -> Result<Self> {
        let bad = || RedactionError::RuleError(s.to_string());
        let (threshold, keep) = s.trim().split_once(':').ok_or_else(bad)?;
        let (left, right) = keep.split_once('*').ok_or_else(bad)?;
        let parse = |part: &str| -> Result<usize> {
            let n: usize = part.trim().parse().map_err(|_| bad())?;
            if n > MAX_RULE_VALUE {
                return Err(bad());
            }
            Ok(n)
        };
        Ok(MaskingRule::new(parse(threshold)?, parse(left)?, parse(right)?))
    }
}

impl fmt::Display for MaskingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}*{}", self.threshold, self.keep_left, self.keep_right)
    }
}

/// Ordered rule list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaskingRules {
    rules: Vec<MaskingRule>,
}

impl MaskingRules {
    pub fn new(rules: Vec<MaskingRule>) -> Self {
        MaskingRules { rules }
    }

    /// The stock rule set: `12:4*4, 11:3*4, 7:2*2, 3:1*1, 2:1*0`.
    pub fn standard() -> Self {
        DEFAULT_RULES.clone()
    }

    /// Parse rule strings, skipping entries that do not parse.
    ///
    /// Returns the rules plus the error for every skipped entry.
    pub fn parse_lenient<S: AsRef<str>>(specs: &[S]) -> (Self, Vec<RedactionError>) {
        let mut rules = Vec::with_capacity(specs.len());
        let mut skipped = Vec::new();
        for spec in specs {
            match spec.as_ref().parse::<MaskingRule>() {
                Ok(rule) => rules.push(rule),
                Err(e) => skipped.push(e),
            }
        }
        (MaskingRules::new(rules), skipped)
    }

    pub fn rules(&self) -> &[MaskingRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Mask `value` with the first rule whose threshold it reaches.
    pub fn mask(&self, value: &str) -> String {
        let chars: Vec<char> = value.chars().collect();
        self.rules
            .iter()
            .find(|rule| chars.len() >= rule.threshold)
            .map(|rule| rule.apply(&chars))
            .unwrap_or_else(|| GENERIC_MASK.to_string())
    }
}
