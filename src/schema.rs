//! The fixed table of section types and the keys each one accepts.
//!
//! The engine never discovers keys from the input: a section type that is
//! not listed here cannot be created, and a key that is not listed for its
//! type is rejected.

use bitflags::bitflags;

bitflags! {
    /// Per-key flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct KeyFlags: u8 {
        /// Still accepted, but a replacement exists (see `KeyDesc::hint`).
        const DEPRECATED = 1 << 0;
        /// May be assigned more than once; values accumulate.
        const LIST = 1 << 1;
        /// Not listed by `Registry::documented_keys`.
        const HIDDEN = 1 << 2;
        /// No longer has any effect; accepted with a warning.
        const REMOVED = 1 << 3;
    }
}

/// One permitted key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyDesc {
    pub name: &'static str,
    pub flags: KeyFlags,
    /// Free text, usually the name of the replacement key.
    pub hint: Option<&'static str>,
}

impl KeyDesc {
    pub const fn new(name: &'static str, flags: KeyFlags, hint: Option<&'static str>) -> KeyDesc {
        KeyDesc { name, flags, hint }
    }

    pub fn is_list(&self) -> bool {
        self.flags.contains(KeyFlags::LIST)
    }
}

/// Plain sections are singletons (`indexer { ... }`), named sections have
/// any number of instances (`index main { ... }`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Plain,
    Named,
}

/// A section type and its key table.
#[derive(Debug, Clone, Copy)]
pub struct SectionDesc {
    pub name: &'static str,
    pub kind: SectionKind,
    pub keys: &'static [KeyDesc],
}

/// Why a lookup failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaError {
    UnknownSection,
    UnknownKey,
}

/// Two-level lookup: section type, then key name.
#[derive(Debug, Clone, Copy)]
pub struct Registry {
    sections: &'static [SectionDesc],
}

impl Default for Registry {
    fn default() -> Registry {
        Registry::standard()
    }
}

impl Registry {
    /// Build a registry from a custom table.
    pub const fn new(sections: &'static [SectionDesc]) -> Registry {
        Registry { sections }
    }

    /// The tables shipped with the engine.
    pub const fn standard() -> Registry {
        Registry { sections: STANDARD }
    }

    pub fn section(&self, name: &str) -> Option<&'static SectionDesc> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Classify a section type name. `None` means the type is unknown.
    pub fn classify(&self, name: &str) -> Option<SectionKind> {
        self.section(name).map(|s| s.kind)
    }

    /// Look up a key of a section type. Key names compare case-insensitively.
    pub fn lookup(&self, section_type: &str, key: &str) -> Result<&'static KeyDesc, SchemaError> {
        let desc = self.section(section_type).ok_or(SchemaError::UnknownSection)?;
        desc.keys
            .iter()
            .find(|k| k.name.eq_ignore_ascii_case(key))
            .ok_or(SchemaError::UnknownKey)
    }

    /// All section types, in table order.
    pub fn section_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.sections.iter().map(|s| s.name)
    }

    /// The keys of a type that show up in documentation: everything except
    /// hidden keys.
    pub fn documented_keys(&self, section_type: &str) -> Vec<&'static KeyDesc> {
        match self.section(section_type) {
            Some(desc) => desc.keys.iter().filter(|k| !k.flags.contains(KeyFlags::HIDDEN)).collect(),
            None => Vec::new(),
        }
    }
}

const fn key(name: &'static str) -> KeyDesc {
    KeyDesc::new(name, KeyFlags::empty(), None)
}

const fn list(name: &'static str) -> KeyDesc {
    KeyDesc::new(name, KeyFlags::LIST, None)
}

const fn hidden(name: &'static str) -> KeyDesc {
    KeyDesc::new(name, KeyFlags::HIDDEN, None)
}

const fn deprecated(name: &'static str, hint: &'static str) -> KeyDesc {
    KeyDesc::new(name, KeyFlags::DEPRECATED, Some(hint))
}

const fn removed(name: &'static str) -> KeyDesc {
    KeyDesc::new(name, KeyFlags::REMOVED, None)
}

static SOURCE_KEYS: &[KeyDesc] = &[
    key("type"),
    key("sql_host"),
    key("sql_user"),
    key("sql_pass"),
    key("sql_db"),
    key("sql_port"),
    key("sql_sock"),
    key("mysql_connect_flags"),
    key("mysql_ssl_key"),
    key("mysql_ssl_cert"),
    key("mysql_ssl_ca"),
    key("mssql_winauth"),
    removed("mssql_unicode"),
    list("sql_query_pre"),
    key("sql_query"),
    key("sql_query_range"),
    key("sql_range_step"),
    key("sql_query_killlist"),
    list("sql_attr_uint"),
    list("sql_attr_bool"),
    list("sql_attr_timestamp"),
    removed("sql_attr_str2ordinal"),
    list("sql_attr_float"),
    list("sql_attr_bigint"),
    list("sql_attr_multi"),
    list("sql_attr_string"),
    removed("sql_attr_str2wordcount"),
    list("sql_attr_json"),
    list("sql_field_string"),
    removed("sql_field_str2wordcount"),
    list("sql_file_field"),
    list("sql_joined_field"),
    list("sql_column_buffers"),
    list("sql_query_post"),
    list("sql_query_post_index"),
    key("sql_ranged_throttle"),
    key("sql_query_info"),
    key("xmlpipe_command"),
    list("xmlpipe_field"),
    list("xmlpipe_attr_uint"),
    list("xmlpipe_attr_timestamp"),
    removed("xmlpipe_attr_str2ordinal"),
    list("xmlpipe_attr_bool"),
    list("xmlpipe_attr_float"),
    list("xmlpipe_attr_bigint"),
    list("xmlpipe_attr_multi"),
    list("xmlpipe_attr_multi_64"),
    list("xmlpipe_attr_string"),
    list("xmlpipe_attr_json"),
    list("xmlpipe_field_string"),
    key("xmlpipe_fixup_utf8"),
    key("unpack_zlib"),
    key("unpack_mysqlcompress"),
    key("unpack_mysqlcompress_maxsize"),
    key("odbc_dsn"),
    list("csvpipe_command"),
    list("csvpipe_field"),
    list("csvpipe_attr_uint"),
    list("csvpipe_attr_string"),
    key("csvpipe_delimiter"),
    hidden("sql_column_mapping"),
];

static INDEX_KEYS: &[KeyDesc] = &[
    list("source"),
    key("path"),
    key("type"),
    key("docinfo"),
    key("mlock"),
    key("morphology"),
    key("stopwords"),
    key("stopword_step"),
    list("wordforms"),
    key("exceptions"),
    key("embedded_limit"),
    key("min_word_len"),
    removed("charset_type"),
    key("charset_table"),
    key("ignore_chars"),
    key("min_prefix_len"),
    key("min_infix_len"),
    key("max_substring_len"),
    key("prefix_fields"),
    key("infix_fields"),
    deprecated("enable_star", "dict=keywords"),
    key("expand_keywords"),
    key("ngram_len"),
    key("ngram_chars"),
    key("phrase_boundary"),
    key("phrase_boundary_step"),
    key("blend_chars"),
    key("blend_mode"),
    key("html_strip"),
    key("html_index_attrs"),
    key("html_remove_elements"),
    key("preopen"),
    key("ondisk_dict"),
    key("inplace_enable"),
    key("inplace_hit_gap"),
    key("inplace_docinfo_gap"),
    key("inplace_reloc_factor"),
    key("inplace_write_factor"),
    key("index_exact_words"),
    key("min_stemming_len"),
    key("overshort_step"),
    list("local"),
    list("agent"),
    list("agent_persistent"),
    list("agent_blackhole"),
    key("agent_connect_timeout"),
    key("agent_query_timeout"),
    key("ha_strategy"),
    list("rt_field"),
    list("rt_attr_uint"),
    list("rt_attr_bigint"),
    list("rt_attr_float"),
    list("rt_attr_timestamp"),
    list("rt_attr_string"),
    list("rt_attr_multi"),
    list("rt_attr_multi_64"),
    list("rt_attr_json"),
    list("rt_attr_bool"),
    key("rt_mem_limit"),
    key("dict"),
    key("index_sp"),
    key("index_zones"),
    key("ondisk_attrs"),
    key("index_field_lengths"),
    key("regexp_filter"),
    key("stopwords_unstemmed"),
    key("global_idf"),
    key("rlp_context"),
    key("bigram_freq_words"),
    key("bigram_index"),
    key("index_token_filter"),
    deprecated("ondisk_dict_default", "ondisk_attrs"),
    hidden("hitless_words"),
];

static INDEXER_KEYS: &[KeyDesc] = &[
    key("mem_limit"),
    key("max_iops"),
    key("max_iosize"),
    key("max_xmlpipe2_field"),
    key("max_file_field_buffer"),
    key("write_buffer"),
    key("on_file_field_error"),
    key("on_json_attr_error"),
    deprecated("json_autoconv_numbers", "common.json_autoconv_numbers"),
    deprecated("json_autoconv_keynames", "common.json_autoconv_keynames"),
    deprecated("lemmatizer_base", "common.lemmatizer_base"),
    key("lemmatizer_cache"),
];

static SEARCHD_KEYS: &[KeyDesc] = &[
    list("listen"),
    removed("address"),
    removed("port"),
    key("log"),
    key("query_log"),
    key("query_log_format"),
    key("read_timeout"),
    key("client_timeout"),
    key("max_children"),
    key("pid_file"),
    removed("max_matches"),
    key("seamless_rotate"),
    key("preopen_indexes"),
    key("unlink_old"),
    key("attr_flush_period"),
    key("ondisk_dict_default"),
    key("max_packet_size"),
    key("mva_updates_pool"),
    key("crash_log_path"),
    key("max_filters"),
    key("max_filter_values"),
    key("listen_backlog"),
    key("read_buffer"),
    key("read_unhinted"),
    key("max_batch_queries"),
    key("subtree_docs_cache"),
    key("subtree_hits_cache"),
    key("workers"),
    key("dist_threads"),
    key("binlog_flush"),
    key("binlog_path"),
    key("binlog_max_log_size"),
    key("thread_stack"),
    key("expansion_limit"),
    key("rt_flush_period"),
    key("query_log_mode"),
    key("prefork_rotation_throttle"),
    key("snippets_file_prefix"),
    key("sphinxql_state"),
    key("rt_merge_iops"),
    key("rt_merge_maxiosize"),
    key("ha_ping_interval"),
    key("ha_period_karma"),
    key("predicted_time_costs"),
    key("persistent_connections_limit"),
    key("ondisk_attrs_default"),
    key("shutdown_timeout"),
    key("query_log_min_msec"),
    key("agent_connect_timeout"),
    key("agent_query_timeout"),
    key("agent_retry_delay"),
    key("agent_retry_count"),
    key("net_wait_tm"),
    key("net_throttle_action"),
    key("net_throttle_accept"),
    key("net_workers"),
    key("queue_max_length"),
    key("qcache_ttl_sec"),
    key("qcache_max_bytes"),
    key("qcache_thresh_msec"),
    key("sphinxql_timeout"),
    key("hostname_lookup"),
    key("watchdog"),
    deprecated("compat_sphinxql_magics", "sphinxql"),
    hidden("test_mode"),
];

static COMMON_KEYS: &[KeyDesc] = &[
    key("lemmatizer_base"),
    key("json_autoconv_numbers"),
    key("json_autoconv_keynames"),
    key("on_json_attr_error"),
    key("rlp_root"),
    key("rlp_environment"),
    key("rlp_max_batch_size"),
    key("rlp_max_batch_docs"),
    key("plugin_dir"),
    key("progressive_merge"),
];

static STANDARD: &[SectionDesc] = &[
    SectionDesc { name: "source", kind: SectionKind::Named, keys: SOURCE_KEYS },
    SectionDesc { name: "index", kind: SectionKind::Named, keys: INDEX_KEYS },
    SectionDesc { name: "indexer", kind: SectionKind::Plain, keys: INDEXER_KEYS },
    SectionDesc { name: "searchd", kind: SectionKind::Plain, keys: SEARCHD_KEYS },
    SectionDesc { name: "common", kind: SectionKind::Plain, keys: COMMON_KEYS },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify() {
        let reg = Registry::standard();
        assert_eq!(reg.classify("index"), Some(SectionKind::Named));
        assert_eq!(reg.classify("searchd"), Some(SectionKind::Plain));
        assert_eq!(reg.classify("Index"), None);
        assert_eq!(reg.classify("database"), None);
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let reg = Registry::standard();
        let k = reg.lookup("indexer", "MEM_LIMIT").unwrap();
        assert_eq!(k.name, "mem_limit");
        assert!(!k.is_list());
        assert!(reg.lookup("index", "source").unwrap().is_list());
    }

    #[test]
    fn lookup_errors() {
        let reg = Registry::standard();
        assert_eq!(reg.lookup("nope", "path"), Err(SchemaError::UnknownSection));
        assert_eq!(reg.lookup("index", "nope"), Err(SchemaError::UnknownKey));
    }

    #[test]
    fn deprecated_keys_carry_a_hint() {
        let reg = Registry::standard();
        let k = reg.lookup("index", "enable_star").unwrap();
        assert!(k.flags.contains(KeyFlags::DEPRECATED));
        assert_eq!(k.hint, Some("dict=keywords"));
    }

    #[test]
    fn hidden_keys_are_not_documented() {
        let reg = Registry::standard();
        let keys = reg.documented_keys("searchd");
        assert!(keys.iter().any(|k| k.name == "listen"));
        assert!(!keys.iter().any(|k| k.name == "test_mode"));
        // but they still resolve.
        assert!(reg.lookup("searchd", "test_mode").is_ok());
        assert!(reg.documented_keys("nope").is_empty());
    }

    #[test]
    fn custom_table() {
        static KEYS: &[KeyDesc] = &[key("a"), list("b")];
        static TABLE: &[SectionDesc] = &[SectionDesc { name: "t", kind: SectionKind::Plain, keys: KEYS }];
        let reg = Registry::new(TABLE);
        assert_eq!(reg.section_types().collect::<Vec<_>>(), vec!["t"]);
        assert!(reg.lookup("t", "b").unwrap().is_list());
        assert!(reg.lookup("index", "path").is_err());
    }
}
