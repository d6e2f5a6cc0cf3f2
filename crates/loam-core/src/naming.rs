use sha1::{Digest, Sha1};
use std::sync::Arc;

/// Rewrites record/field names before snake-casing, e.g. to strip a
/// project-wide prefix.
pub trait Replacer: Send + Sync {
    fn replace(&self, name: &str) -> String;
}

/// Converts record and field names into table, column, and constraint
/// identifiers.
#[derive(Clone, Default)]
pub struct NamingStrategy {
    pub table_prefix: String,
    pub singular_table: bool,
    pub no_lower_case: bool,
    pub name_replacer: Option<Arc<dyn Replacer>>,
}

// Acronyms that collapse to a single snake segment instead of splitting on
// every capital.
const COMMON_INITIALISMS: &[&str] = &[
    "API", "ASCII", "CPU", "CSS", "DNS", "EOF", "GUID", "HTML", "HTTP", "HTTPS", "ID", "IP",
    "JSON", "LHS", "QPS", "RAM", "RHS", "RPC", "SLA", "SMTP", "SSH", "TLS", "TTL", "UID", "UI",
    "UUID", "URI", "URL", "UTF8", "VM", "XML", "XSRF", "XSS",
];

impl NamingStrategy {
    /// Table name for a record type name.
    pub fn table_name(&self, name: &str) -> String {
        if self.singular_table {
            format!("{}{}", self.table_prefix, self.to_db_name(name))
        } else {
            format!(
                "{}{}",
                self.table_prefix,
                pluralizer::pluralize(&self.to_db_name(name), 2, false)
            )
        }
    }

    /// Column name for a field name. The table argument participates in
    /// custom strategies; the default ignores it.
    pub fn column_name(&self, _table: &str, column: &str) -> String {
        self.to_db_name(column)
    }

    /// Join table name for a many-to-many annotation value.
    pub fn join_table_name(&self, name: &str) -> String {
        if !self.no_lower_case && name.to_lowercase() == name {
            return format!("{}{}", self.table_prefix, name);
        }
        self.table_name(name)
    }

    /// Foreign key constraint name for a relationship.
    pub fn relationship_fk_name(&self, table: &str, relation: &str) -> String {
        self.format_name("fk", table, &self.to_db_name(relation))
    }

    /// Check constraint name.
    pub fn checker_name(&self, table: &str, column: &str) -> String {
        self.format_name("chk", table, column)
    }

    /// Index name.
    pub fn index_name(&self, table: &str, column: &str) -> String {
        self.format_name("idx", table, &self.to_db_name(column))
    }

    fn format_name(&self, prefix: &str, table: &str, name: &str) -> String {
        let formatted = format!("{prefix}_{table}_{name}").replace('.', "_");
        if formatted.chars().count() <= 64 {
            return formatted;
        }

        let digest = Sha1::digest(formatted.as_bytes());
        let mut hash = String::with_capacity(8);
        for byte in digest.iter().take(4) {
            hash.push_str(&format!("{byte:02x}"));
        }

        let head: String = formatted.chars().take(56).collect();
        format!("{head}{hash}")
    }

    /// Snake-case a name, keeping common initialisms as single segments:
    /// `HTTPServerID` becomes `http_server_id`, not `h_t_t_p_server_i_d`.
    pub fn to_db_name(&self, name: &str) -> String {
        if name.is_empty() {
            return String::new();
        }

        let mut name = name.to_owned();
        if let Some(replacer) = &self.name_replacer {
            let replaced = replacer.replace(&name);
            if !replaced.is_empty() {
                name = replaced;
            }
        }

        if self.no_lower_case {
            return name;
        }

        // Rewrite initialisms to title case so the splitter sees one capital.
        let mut value = name;
        for initialism in COMMON_INITIALISMS {
            if value.contains(initialism) {
                let mut title: String = initialism.to_lowercase();
                if let Some(first) = title.get_mut(0..1) {
                    first.make_ascii_uppercase();
                }
                value = value.replace(initialism, &title);
            }
        }

        let bytes = value.as_bytes();
        let mut buf = Vec::with_capacity(bytes.len() + bytes.len() / 2);

        let is_upper = |b: u8| b.is_ascii_uppercase();
        let is_digit = |b: u8| b.is_ascii_digit();

        let mut last_case = false;
        let mut cur_case = is_upper(bytes[0]);

        for i in 0..bytes.len() - 1 {
            let v = bytes[i];
            let next_case = is_upper(bytes[i + 1]);
            let next_number = is_digit(bytes[i + 1]);

            if cur_case {
                if last_case && (next_case || next_number) {
                    buf.push(v + 32);
                } else {
                    if i > 0 && bytes[i - 1] != b'_' && bytes[i + 1] != b'_' {
                        buf.push(b'_');
                    }
                    buf.push(v + 32);
                }
            } else {
                buf.push(v);
            }

            last_case = cur_case;
            cur_case = next_case;
        }

        let last = bytes[bytes.len() - 1];
        if cur_case {
            if !last_case && bytes.len() > 1 {
                buf.push(b'_');
            }
            buf.push(last + 32);
        } else {
            buf.push(last);
        }

        String::from_utf8(buf).unwrap_or_default()
    }
}

impl core::fmt::Debug for NamingStrategy {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("NamingStrategy")
            .field("table_prefix", &self.table_prefix)
            .field("singular_table", &self.singular_table)
            .field("no_lower_case", &self.no_lower_case)
            .finish()
    }
}
