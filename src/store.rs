//! The configuration tree: section type -> instance name -> key -> values.
//!
//! Everything is insertion-ordered. A key holds a chain of values; the chain
//! remembers whether it was copied from a parent section and has not been
//! assigned in the child yet.

use std::str::FromStr;
use std::time::Duration;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::de::SectionDeserializer;
use crate::error::{Error, ErrorKind, Result};

/// One assigned value and its declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value {
    value: String,
    tag: u32,
}

impl Value {
    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// Monotonically increasing over a parse; tells the order in which
    /// values were declared.
    pub fn tag(&self) -> u32 {
        self.tag
    }
}

/// The ordered values of one key within one section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyChain {
    values: Vec<Value>,
    inherited: bool,
}

impl KeyChain {
    fn new(value: Value) -> KeyChain {
        KeyChain { values: vec![value], inherited: false }
    }

    /// The first declared value.
    pub fn first(&self) -> &str {
        // a chain is never empty.
        self.values[0].as_str()
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|v| v.as_str())
    }

    pub fn entries(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Copied from a parent section and not yet overridden.
    pub fn is_inherited(&self) -> bool {
        self.inherited
    }
}

/// How `Section::add` treated a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// First value of the key.
    Inserted,
    /// Replaced an inherited chain.
    Overridden,
    /// Appended to the existing chain.
    Appended,
}

/// One section instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Section {
    keys: IndexMap<String, KeyChain>,
}

impl Section {
    pub fn new() -> Section {
        Section::default()
    }

    /// Add a value under `key`.
    ///
    /// An inherited chain is thrown away wholesale by the first explicit
    /// assignment. Otherwise the value goes to the tail of the chain.
    pub(crate) fn add(&mut self, key: &str, value: String, tag: u32) -> AddOutcome {
        let value = Value { value, tag };
        match self.keys.get_mut(key) {
            None => {
                self.keys.insert(key.to_string(), KeyChain::new(value));
                AddOutcome::Inserted
            }
            Some(chain) if chain.inherited => {
                *chain = KeyChain::new(value);
                AddOutcome::Overridden
            }
            Some(chain) => {
                chain.values.push(value);
                AddOutcome::Appended
            }
        }
    }

    /// Copy of this section with every chain marked inherited.
    pub(crate) fn inherit(&self) -> Section {
        let mut copy = self.clone();
        for chain in copy.keys.values_mut() {
            chain.inherited = true;
        }
        copy
    }

    /// Drop a trailing `}` from the last value of `key`, if it has no
    /// matching `{` in the value. Returns `false` if nothing was dropped.
    pub(crate) fn strip_trailing_brace(&mut self, key: &str) -> bool {
        let last = match self.keys.get_mut(key).and_then(|c| c.values.last_mut()) {
            Some(v) => v,
            None => return false,
        };
        let opened = last.value.matches('{').count();
        let closed = last.value.matches('}').count();
        if !last.value.ends_with('}') || closed <= opened {
            return false;
        }
        last.value.pop();
        let len = last.value.trim_end().len();
        last.value.truncate(len);
        true
    }

    pub fn get(&self, key: &str) -> Option<&KeyChain> {
        self.keys.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains_key(key)
    }

    /// First value of `key`.
    pub fn first(&self, key: &str) -> Option<&str> {
        self.keys.get(key).map(|c| c.first())
    }

    /// All values of `key`, in declaration order. Empty if the key is absent.
    pub fn values<'a>(&'a self, key: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.keys.get(key).into_iter().flat_map(|c| c.values())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &KeyChain)> {
        self.keys.iter().map(|(k, c)| (k.as_str(), c))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn get_str<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.first(key).unwrap_or(default)
    }

    pub fn get_int(&self, key: &str, default: i64) -> Result<i64> {
        match self.first(key) {
            Some(v) => parse_int(key, v),
            None => Ok(default),
        }
    }

    /// `0` is false, any other integer is true.
    pub fn get_bool(&self, key: &str, default: bool) -> Result<bool> {
        match self.first(key) {
            Some(v) => parse_int(key, v).map(|n| n != 0),
            None => Ok(default),
        }
    }

    /// Byte size with an optional `k`, `m`, `g` or `t` suffix (base 1024).
    pub fn get_size(&self, key: &str, default: u64) -> Result<u64> {
        match self.first(key) {
            Some(v) => parse_size(v).ok_or_else(|| invalid(key, v, "size")),
            None => Ok(default),
        }
    }

    /// Duration with an optional `us`, `ms`, `s`, `m`, `h`, `d` or `w`
    /// suffix. A bare number is seconds.
    pub fn get_duration(&self, key: &str, default: Duration) -> Result<Duration> {
        match self.first(key) {
            Some(v) => parse_duration(v).ok_or_else(|| invalid(key, v, "duration")),
            None => Ok(default),
        }
    }

    /// Deserialize this section into a struct whose fields are key names.
    pub fn deserialize<'de, T>(&'de self) -> Result<T>
    where
        T: Deserialize<'de>,
    {
        T::deserialize(SectionDeserializer::new(self))
    }
}

fn invalid(key: &str, value: &str, what: &str) -> Error {
    Error::new(ErrorKind::Value, format!("key '{}': invalid {} value '{}'", key, what, value))
}

fn parse_int(key: &str, v: &str) -> Result<i64> {
    i64::from_str(v.trim()).map_err(|_| invalid(key, v, "integer"))
}

pub(crate) fn parse_size(v: &str) -> Option<u64> {
    static RE_SIZE: Lazy<Regex> = Lazy::new(|| {
        let re = r"^\s*([0-9]+)\s*([kKmMgGtT]?)\s*$";
        Regex::new(re).expect("could not compile RE_SIZE regexp")
    });
    let caps = RE_SIZE.captures(v)?;
    let n = u64::from_str(&caps[1]).ok()?;
    let shift = match caps[2].to_ascii_lowercase().as_str() {
        "k" => 10,
        "m" => 20,
        "g" => 30,
        "t" => 40,
        _ => 0,
    };
    n.checked_mul(1u64 << shift)
}

pub(crate) fn parse_duration(v: &str) -> Option<Duration> {
    static RE_DURATION: Lazy<Regex> = Lazy::new(|| {
        let re = r"^\s*([0-9]+)\s*(us|ms|s|m|h|d|w)?\s*$";
        Regex::new(re).expect("could not compile RE_DURATION regexp")
    });
    let lower = v.to_ascii_lowercase();
    let caps = RE_DURATION.captures(&lower)?;
    let n = u64::from_str(&caps[1]).ok()?;
    let secs = |mul: u64| n.checked_mul(mul).map(Duration::from_secs);
    match caps.get(2).map(|m| m.as_str()) {
        Some("us") => Some(Duration::from_micros(n)),
        Some("ms") => Some(Duration::from_millis(n)),
        Some("m") => secs(60),
        Some("h") => secs(3600),
        Some("d") => secs(86400),
        Some("w") => secs(7 * 86400),
        _ => Some(Duration::from_secs(n)),
    }
}

/// The whole configuration tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    sections: IndexMap<String, IndexMap<String, Section>>,
    next_tag: u32,
}

impl Config {
    pub fn new() -> Config {
        Config::default()
    }

    /// Create an empty section instance. Returns `false` if an instance of
    /// that name already exists within the type.
    pub(crate) fn add_section(&mut self, section_type: &str, name: &str) -> bool {
        let instances = self.sections.entry(section_type.to_string()).or_default();
        if instances.contains_key(name) {
            return false;
        }
        instances.insert(name.to_string(), Section::new());
        true
    }

    /// Replace `name` with an inherited copy of `parent`. Returns `false` if
    /// the parent does not exist.
    pub(crate) fn inherit(&mut self, section_type: &str, name: &str, parent: &str) -> bool {
        let instances = match self.sections.get_mut(section_type) {
            Some(i) => i,
            None => return false,
        };
        let copy = match instances.get(parent) {
            Some(p) => p.inherit(),
            None => return false,
        };
        instances.insert(name.to_string(), copy);
        true
    }

    pub(crate) fn section_mut(&mut self, section_type: &str, name: &str) -> Option<&mut Section> {
        self.sections.get_mut(section_type)?.get_mut(name)
    }

    pub(crate) fn next_tag(&mut self) -> u32 {
        let tag = self.next_tag;
        self.next_tag += 1;
        tag
    }

    /// Look up a section instance.
    pub fn section(&self, section_type: &str, name: &str) -> Option<&Section> {
        self.sections.get(section_type)?.get(name)
    }

    /// Look up a plain (singleton) section.
    pub fn plain(&self, section_type: &str) -> Option<&Section> {
        self.section(section_type, section_type)
    }

    /// All instances of a section type, in declaration order.
    pub fn sections<'a>(&'a self, section_type: &str) -> impl Iterator<Item = (&'a str, &'a Section)> + 'a {
        self.sections
            .get(section_type)
            .into_iter()
            .flat_map(|i| i.iter().map(|(n, s)| (n.as_str(), s)))
    }

    pub fn section_types(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(|k| k.as_str())
    }

    pub fn has_type(&self, section_type: &str) -> bool {
        self.sections.get(section_type).map(|i| !i.is_empty()).unwrap_or(false)
    }

    pub fn is_empty(&self) -> bool {
        self.sections.values().all(|i| i.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(pairs: &[(&str, &str)]) -> Section {
        let mut s = Section::new();
        for (tag, (k, v)) in pairs.iter().enumerate() {
            s.add(k, v.to_string(), tag as u32);
        }
        s
    }

    #[test]
    fn trailing_brace() {
        let mut s = section(&[("path", "/data/i }"), ("regexp_filter", "a{3}"), ("stopwords", "x")]);
        assert!(s.strip_trailing_brace("path"));
        assert_eq!(s.first("path"), Some("/data/i"));
        assert!(!s.strip_trailing_brace("regexp_filter"));
        assert_eq!(s.first("regexp_filter"), Some("a{3}"));
        assert!(!s.strip_trailing_brace("stopwords"));
        assert!(!s.strip_trailing_brace("missing"));
    }

    #[test]
    fn chain_keeps_declaration_order() {
        let s = section(&[("listen", "9312"), ("listen", "9306:mysql41"), ("log", "x")]);
        assert_eq!(s.values("listen").collect::<Vec<_>>(), vec!["9312", "9306:mysql41"]);
        assert_eq!(s.keys().collect::<Vec<_>>(), vec!["listen", "log"]);
        let tags: Vec<_> = s.get("listen").unwrap().entries().iter().map(|v| v.tag()).collect();
        assert_eq!(tags, vec![0, 1]);
    }

    #[test]
    fn inherited_chain_is_replaced_wholesale() {
        let parent = section(&[("source", "a"), ("source", "b"), ("path", "/p")]);
        let mut child = parent.inherit();
        assert!(child.get("source").unwrap().is_inherited());

        assert_eq!(child.add("source", "c".into(), 10), AddOutcome::Overridden);
        assert_eq!(child.values("source").collect::<Vec<_>>(), vec!["c"]);
        assert!(!child.get("source").unwrap().is_inherited());

        // second assignment appends again.
        assert_eq!(child.add("source", "d".into(), 11), AddOutcome::Appended);
        assert_eq!(child.values("source").collect::<Vec<_>>(), vec!["c", "d"]);

        // untouched keys keep the parent's values.
        assert_eq!(child.first("path"), Some("/p"));
        assert!(child.get("path").unwrap().is_inherited());

        // the parent is unaffected.
        assert_eq!(parent.values("source").count(), 2);
    }

    #[test]
    fn duplicate_instance() {
        let mut cfg = Config::new();
        assert!(cfg.add_section("source", "s"));
        assert!(!cfg.add_section("source", "s"));
        // names are scoped per type.
        assert!(cfg.add_section("index", "s"));
        assert_eq!(cfg.section_types().collect::<Vec<_>>(), vec!["source", "index"]);
    }

    #[test]
    fn inherit_missing_parent() {
        let mut cfg = Config::new();
        cfg.add_section("index", "b");
        assert!(!cfg.inherit("index", "b", "a"));
        assert!(!cfg.inherit("source", "b", "a"));
    }

    #[test]
    fn typed_accessors() {
        let s = section(&[
            ("mem_limit", "128M"),
            ("max_iosize", "1048576"),
            ("read_timeout", "5"),
            ("client_timeout", "2h"),
            ("net_wait_tm", "500ms"),
            ("workers", "threads"),
            ("mlock", "1"),
        ]);
        assert_eq!(s.get_size("mem_limit", 0).unwrap(), 128 << 20);
        assert_eq!(s.get_size("max_iosize", 0).unwrap(), 1048576);
        assert_eq!(s.get_size("write_buffer", 4096).unwrap(), 4096);
        assert_eq!(s.get_duration("read_timeout", Duration::from_secs(1)).unwrap(), Duration::from_secs(5));
        assert_eq!(s.get_duration("client_timeout", Duration::from_secs(1)).unwrap(), Duration::from_secs(7200));
        assert_eq!(s.get_duration("net_wait_tm", Duration::from_secs(1)).unwrap(), Duration::from_millis(500));
        assert_eq!(s.get_int("max_iosize", 0).unwrap(), 1048576);
        assert!(s.get_bool("mlock", false).unwrap());
        assert_eq!(s.get_str("workers", "fork"), "threads");
        assert_eq!(s.get_str("pid_file", "none"), "none");

        let err = s.get_int("workers", 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Value);
        assert!(err.msg.contains("invalid integer"));
        assert!(s.get_size("workers", 0).is_err());
    }

    #[test]
    fn size_and_duration_parsing() {
        assert_eq!(parse_size("2k"), Some(2048));
        assert_eq!(parse_size("1G"), Some(1 << 30));
        assert_eq!(parse_size("12x"), None);
        assert_eq!(parse_size(""), None);
        assert_eq!(parse_duration("3US"), Some(Duration::from_micros(3)));
        assert_eq!(parse_duration("1w"), Some(Duration::from_secs(604800)));
        assert_eq!(parse_duration("10 m"), Some(Duration::from_secs(600)));
        assert_eq!(parse_duration("m"), None);
    }
}
