//! Main redaction engine.
//!
//! The [`Redactor`] walks an event's payload depth-first. A leaf under a
//! sensitive field name is masked wholesale; every other string or number
//! leaf is scanned with the sensitive patterns. Rewrites are copy-on-write:
//! a container is reallocated only if one of its descendants changed.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use evlog_common::{Event, Fields, Value};
use regex::Regex;
use tracing::warn;

use crate::error::{RedactionError, Result};
use crate::policy::RedactionPolicy;
use crate::rule::MaskingRules;

/// Custom masking function, replacing the length rules.
pub type Masker = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Normalize a field name for sensitivity matching: lower-case, no hyphens.
///
/// `Access-Token`, `accessToken` and `accesstoken` all normalize to
/// `accesstoken`.
pub fn normalize_field_name(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// A compiled pattern plus the capture group it masks.
#[derive(Debug, Clone)]
struct SensitivePattern {
    regex: Regex,
    group: usize,
}

impl SensitivePattern {
    fn compile(source: &str) -> Result<Self> {
        let regex = Regex::new(source).map_err(|e| RedactionError::PatternError {
            pattern: source.to_string(),
            message: e.to_string(),
        })?;
        // captures_len counts the implicit whole-match group
        let group = match regex.captures_len() - 1 {
            1 => 1,
            3 => 2,
            groups => {
                return Err(RedactionError::GroupCount {
                    pattern: source.to_string(),
                    groups,
                })
            }
        };
        Ok(SensitivePattern { regex, group })
    }

    /// Mask the selected group of every non-overlapping match, left to right.
    fn substitute(&self, text: &str, mask: impl Fn(&str) -> String) -> Option<String> {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        let mut hit = false;
        for caps in self.regex.captures_iter(text) {
            let Some(m) = caps.get(self.group) else {
                continue;
            };
            out.push_str(&text[last..m.start()]);
            out.push_str(&mask(m.as_str()));
            last = m.end();
            hit = true;
        }
        if !hit {
            return None;
        }
        out.push_str(&text[last..]);
        Some(out)
    }
}

/// The redaction engine.
pub struct Redactor {
    names: HashSet<String>,
    patterns: Vec<SensitivePattern>,
    rules: MaskingRules,
    masker: Option<Masker>,
    max_depth: usize,
    setup_warnings: Vec<RedactionError>,
}

impl fmt::Debug for Redactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Redactor")
            .field("names", &self.names)
            .field("patterns", &self.patterns.len())
            .field("rules", &self.rules)
            .field("custom_masker", &self.masker.is_some())
            .field("max_depth", &self.max_depth)
            .finish()
    }
}

impl Redactor {
    /// Build a redactor. Patterns and rules that fail to parse are skipped
    /// and kept in [`Redactor::setup_warnings`].
    pub fn new(policy: &RedactionPolicy) -> Self {
        let names = policy
            .sensitive
            .iter()
            .map(|name| normalize_field_name(name.trim()))
            .filter(|name| !name.is_empty())
            .collect();

        let mut setup_warnings = Vec::new();
        let mut patterns = Vec::with_capacity(policy.regex_sensitive.len());
        for source in &policy.regex_sensitive {
            match SensitivePattern::compile(source) {
                Ok(pattern) => patterns.push(pattern),
                Err(e) => {
                    warn!(error = %e, "skipping sensitive pattern");
                    setup_warnings.push(e);
                }
            }
        }

        let (rules, skipped) = MaskingRules::parse_lenient(&policy.sensitive_rule);
        for e in skipped {
            warn!(error = %e, "skipping masking rule");
            setup_warnings.push(e);
        }

        Redactor {
            names,
            patterns,
            rules,
            masker: None,
            max_depth: policy.max_depth,
            setup_warnings,
        }
    }

    /// Build a redactor, failing on the first pattern or rule that does not
    /// parse.
    pub fn try_new(policy: &RedactionPolicy) -> Result<Self> {
        let mut redactor = Self::new(policy);
        if redactor.setup_warnings.is_empty() {
            return Ok(redactor);
        }
        Err(redactor.setup_warnings.swap_remove(0))
    }

    /// Replace the length rules with a custom masking function.
    pub fn with_masker<F>(mut self, masker: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.masker = Some(Arc::new(masker));
        self
    }

    /// Problems found while building this redactor.
    pub fn setup_warnings(&self) -> &[RedactionError] {
        &self.setup_warnings
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Whether `name` is a configured sensitive field.
    pub fn is_sensitive(&self, name: &str) -> bool {
        !self.names.is_empty() && self.names.contains(&normalize_field_name(name))
    }

    /// Mask a whole value.
    pub fn mask(&self, text: &str) -> String {
        match &self.masker {
            Some(masker) => masker(text),
            None => self.rules.mask(text),
        }
    }

    /// Apply every sensitive pattern to `text`. `None` means unchanged.
    pub fn redact_text(&self, text: &str) -> Option<String> {
        let mut current = Cow::Borrowed(text);
        for pattern in &self.patterns {
            if let Some(next) = pattern.substitute(&current, |s| self.mask(s)) {
                current = Cow::Owned(next);
            }
        }
        match current {
            Cow::Owned(s) if s != text => Some(s),
            _ => None,
        }
    }

    /// Redact an event, returning a copy that shares untouched subtrees.
    pub fn redact(&self, event: &Event) -> Event {
        let extra = event.extra();
        match self.rewrite_fields(extra, 1) {
            Some(rewritten) => {
                let mut out = event.clone();
                out.replace_extra(rewritten);
                out
            }
            None => event.clone(),
        }
    }

    /// Redact a single value held under field `key` at the top level.
    pub fn redact_value(&self, key: &str, value: &Value) -> Value {
        self.rewrite(key, value, 1).unwrap_or_else(|| value.clone())
    }

    /// Rewrite `value`, held under `key` at `depth`. `None` means unchanged.
    fn rewrite(&self, key: &str, value: &Value, depth: usize) -> Option<Value> {
        if depth > self.max_depth {
            return None;
        }
        match value {
            Value::Null => None,
            Value::Bool(b) => self
                .is_sensitive(key)
                .then(|| Value::Str(self.mask(&b.to_string()))),
            Value::Str(_) | Value::Int(_) | Value::Float(_) => {
                let text = value.leaf_text()?;
                if self.is_sensitive(key) {
                    return Some(Value::Str(self.mask(&text)));
                }
                self.redact_text(&text).map(Value::Str)
            }
            Value::List(items) => {
                let mut out: Option<Vec<Value>> = None;
                for (idx, item) in items.iter().enumerate() {
                    // list elements are matched under the list's own name
                    if let Some(new) = self.rewrite(key, item, depth + 1) {
                        out.get_or_insert_with(|| items.to_vec())[idx] = new;
                    }
                }
                out.map(Value::list)
            }
            Value::Map(map) => {
                let mut out: Option<BTreeMap<String, Value>> = None;
                for (k, v) in map.iter() {
                    if let Some(new) = self.rewrite(k, v, depth + 1) {
                        out.get_or_insert_with(|| (**map).clone())
                            .insert(k.clone(), new);
                    }
                }
                out.map(Value::map)
            }
            Value::Record(fields) => self.rewrite_fields(fields, depth + 1).map(Value::record),
        }
    }

    /// Rewrite every field of a record whose fields sit at `depth`.
    fn rewrite_fields(&self, fields: &Fields, depth: usize) -> Option<Fields> {
        let changes: Vec<(usize, Value)> = fields
            .iter()
            .enumerate()
            .filter_map(|(idx, (k, v))| self.rewrite(k, v, depth).map(|new| (idx, new)))
            .collect();
        if changes.is_empty() {
            return None;
        }
        let mut out = fields.clone();
        let mut changes = changes.into_iter().peekable();
        for (idx, slot) in out.values_mut().enumerate() {
            if let Some((_, new)) = changes.next_if(|(i, _)| *i == idx) {
                *slot = new;
            }
        }
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evlog_common::fields;

    fn redactor() -> Redactor {
        let policy = RedactionPolicy::default()
            .with_sensitive(["phone", "password", "name", "token", "accessToken"])
            .with_patterns([r"(^|[^\d])(1\d{10})([^\d]|$)", r"\[(\w+)\]"]);
        Redactor::new(&policy)
    }

    fn masked(redactor: &Redactor, key: &str, value: impl Into<Value>) -> Value {
        redactor.redact_value(key, &value.into())
    }

    // ============================================================================
    // Field names
    // ============================================================================

    #[test]
    fn test_normalize_field_name() {
        assert_eq!(normalize_field_name("Access-Token"), "accesstoken");
        assert_eq!(normalize_field_name("accessToken"), "accesstoken");
        assert_eq!(normalize_field_name("access_token"), "access_token");
    }

    #[test]
    fn test_sensitive_names_mask_leaves() {
        let r = redactor();
        assert_eq!(masked(&r, "password", "abcd1234"), Value::from("ab****34"));
        assert_eq!(masked(&r, "name", "张三"), Value::from("张*"));
        assert_eq!(masked(&r, "name", "张小三"), Value::from("张*三"));
        assert_eq!(masked(&r, "accessToken", "1122"), Value::from("1**2"));
        assert_eq!(masked(&r, "Access-Token", "1122"), Value::from("1**2"));
        assert_eq!(masked(&r, "accesstoken", "1122"), Value::from("1**2"));
        assert_eq!(masked(&r, "phone", "13912345678"), Value::from("139****5678"));
        assert_eq!(masked(&r, "phone", 13912345678_i64), Value::from("139****5678"));
    }

    #[test]
    fn test_sensitive_null_stays_null() {
        let r = redactor();
        assert_eq!(masked(&r, "password", Value::Null), Value::Null);
    }

    #[test]
    fn test_list_elements_inherit_field_name() {
        let r = redactor();
        let value = masked(&r, "token", vec!["abcd1234", "1122"]);
        assert_eq!(value, Value::from(vec!["ab****34", "1**2"]));
    }

    #[test]
    fn test_sensitive_container_checks_its_leaves_by_name() {
        let r = redactor();
        let value = masked(&r, "password", fields! { "hint" => "blue", "len" => 8 });
        assert_eq!(value, Value::from(fields! { "hint" => "blue", "len" => 8 }));
    }

    // ============================================================================
    // Patterns
    // ============================================================================

    #[test]
    fn test_single_group_pattern() {
        let r = redactor();
        assert_eq!(
            masked(&r, "memo", "hi, [Star]! are you ok?"),
            Value::from("hi, [S**r]! are you ok?")
        );
    }

    #[test]
    fn test_three_group_pattern_masks_middle_only() {
        let r = redactor();
        let input = "13912345678 is a phone, the phone is 13912345678 not 13912345677 and not 139123456781, is 13912345678";
        let expected = "139****5678 is a phone, the phone is 139****5678 not 139****5677 and not 139123456781, is 139****5678";
        assert_eq!(masked(&r, "memo", input), Value::from(expected));
    }

    #[test]
    fn test_pattern_applies_to_number_leaves() {
        let r = redactor();
        assert_eq!(masked(&r, "mobile", 13912345678_i64), Value::from("139****5678"));
        assert_eq!(masked(&r, "count", 42), Value::Int(42));
    }

    #[test]
    fn test_bad_patterns_are_reported_and_skipped() {
        let policy = RedactionPolicy::default().with_patterns(["(unclosed", "(a)(b)", r"\[(\w+)\]"]);
        let r = Redactor::new(&policy);
        assert_eq!(r.setup_warnings().len(), 2);
        assert!(matches!(
            r.setup_warnings()[0],
            RedactionError::PatternError { .. }
        ));
        assert!(matches!(
            r.setup_warnings()[1],
            RedactionError::GroupCount { groups: 2, .. }
        ));
        assert_eq!(masked(&r, "memo", "[Star]"), Value::from("[S**r]"));
        assert!(Redactor::try_new(&policy).is_err());
    }

    #[test]
    fn test_try_new_accepts_valid_and_rejects_invalid() {
        let valid = RedactionPolicy::default().with_patterns([r"\[(\w+)\]"]);
        let r = Redactor::try_new(&valid).unwrap();
        assert!(r.setup_warnings().is_empty());
        assert_eq!(masked(&r, "memo", "[Star]"), Value::from("[S**r]"));

        let invalid = RedactionPolicy::default().with_patterns(["(unclosed", "(a)(b)"]);
        let err = Redactor::try_new(&invalid).unwrap_err();
        assert!(matches!(err, RedactionError::PatternError { .. }));
    }

    #[test]
    fn test_custom_masker() {
        let r = redactor().with_masker(|s| format!("<{} chars>", s.chars().count()));
        assert_eq!(masked(&r, "password", "secret"), Value::from("<6 chars>"));
        assert_eq!(masked(&r, "memo", "[Star]"), Value::from("[<4 chars>]"));
    }

    // ============================================================================
    // Structure
    // ============================================================================

    #[test]
    fn test_nested_request_payload() {
        let r = redactor();
        let mut headers = BTreeMap::new();
        headers.insert("Access-Token".to_string(), Value::from("isRegisterTokenXXX"));
        headers.insert("Content-Type".to_string(), Value::from("application/json"));
        let event = Event::new("request").with_fields(fields! {
            "requestData" => fields! { "node" => "192.168.199.128:58788", "token" => "isBuilderTokenXXX" },
            "requestHeaders" => headers,
            "responseCode" => 403,
        });
        let out = r.redact(&event);

        let Some(Value::Record(data)) = out.get("requestData") else {
            panic!("requestData should stay a record");
        };
        assert_eq!(data.get("token"), Some(&Value::from("isBu*********nXXX")));
        assert_eq!(data.get("node"), Some(&Value::from("192.168.199.128:58788")));

        let Some(Value::Map(headers)) = out.get("requestHeaders") else {
            panic!("requestHeaders should stay a map");
        };
        assert_eq!(headers["Access-Token"], Value::from("isRe**********nXXX"));
        assert_eq!(headers["Content-Type"], Value::from("application/json"));
    }

    #[test]
    fn test_untouched_siblings_are_shared() {
        let r = redactor();
        let event = Event::new("info").with_fields(fields! {
            "user" => fields! { "password" => "abcd1234", "prefs" => fields! { "theme" => "dark" } },
            "tags" => vec!["a", "b"],
        });
        let out = r.redact(&event);

        let tags_before = event.get("tags").unwrap();
        let tags_after = out.get("tags").unwrap();
        assert!(tags_before.shares_allocation(tags_after));

        let (Some(Value::Record(user_before)), Some(Value::Record(user_after))) =
            (event.get("user"), out.get("user"))
        else {
            panic!("user should be a record");
        };
        assert!(!Arc::ptr_eq(user_before, user_after));
        assert!(user_before
            .get("prefs")
            .unwrap()
            .shares_allocation(user_after.get("prefs").unwrap()));
        // input is never mutated
        assert_eq!(user_before.get("password"), Some(&Value::from("abcd1234")));
    }

    #[test]
    fn test_unchanged_event_is_equal() {
        let r = redactor();
        let event = Event::new("info").with_fields(fields! { "ok" => true, "n" => 3 });
        assert_eq!(r.redact(&event), event);
    }

    #[test]
    fn test_depth_cap_fails_open() {
        let policy = RedactionPolicy::default().with_max_depth(3);
        let r = Redactor::new(&policy);

        // password at depth 3 is masked, at depth 4 it is not
        let shallow = fields! { "a" => fields! { "b" => fields! { "password" => "abcd1234" } } };
        let deep = fields! { "x" => fields! { "b" => fields! { "c" => fields! { "password" => "abcd1234" } } } };
        let event = Event::new("info").with_fields(shallow).with_fields(deep);

        let out = r.redact(&event);
        assert!(format!("{:?}", out.get("a")).contains("ab****34"));
        assert!(format!("{:?}", out.get("x")).contains("abcd1234"));
        assert!(out.get("x").unwrap().shares_allocation(event.get("x").unwrap()));
    }

    #[test]
    fn test_very_deep_structure_terminates() {
        let r = Redactor::new(&RedactionPolicy::default());
        let mut value = Value::from(fields! { "password" => "abcd1234" });
        for _ in 0..1_000 {
            value = Value::list(vec![value]);
        }
        let out = r.redact_value("wrapper", &value);
        assert!(out.shares_allocation(&value));
    }
}
