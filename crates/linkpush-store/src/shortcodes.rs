//! Bidirectional URL ↔ shortcode map.
//!
//! Both directions live behind one [`RwLock`] so inserting a pair is a
//! single critical section: a code is never visible without its URL and a
//! URL never gains a second canonical code.

use std::collections::HashMap;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use linkpush_core::LinkError;
use parking_lot::RwLock;
use tracing::debug;

/// Default number of characters in a generated code.
pub const DEFAULT_CODE_LENGTH: usize = 8;

/// Shortest code [`ShortcodeStore::new`] generates.
pub const MIN_CODE_LENGTH: usize = 4;

/// Source of candidate codes. Collisions are retried by the store.
pub type CodeGenerator = Box<dyn Fn() -> String + Send + Sync>;

#[derive(Default)]
struct Tables {
    by_code: HashMap<String, String>,
    by_url: HashMap<String, String>,
}

/// Append-only shortcode table.
pub struct ShortcodeStore {
    tables: RwLock<Tables>,
    generate: CodeGenerator,
}

impl ShortcodeStore {
    /// Store generating random URL-safe codes of `code_length` characters,
    /// raised to [`MIN_CODE_LENGTH`] if shorter.
    pub fn new(code_length: usize) -> Self {
        let code_length = code_length.max(MIN_CODE_LENGTH);
        Self::with_generator(Box::new(move || random_code(code_length)))
    }

    /// Store drawing candidate codes from `generate`.
    pub fn with_generator(generate: CodeGenerator) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            generate,
        }
    }

    /// Existing code for an exact-match `url`.
    pub fn resolve(&self, url: &str) -> Option<String> {
        self.tables.read().by_url.get(url).cloned()
    }

    /// Mint a fresh code for `url` and store the pair.
    ///
    /// Does not deduplicate: if `url` already has a canonical code that
    /// code stays canonical and the new one is an additional alias.
    /// Use [`resolve_or_assign`](Self::resolve_or_assign) on request paths.
    pub fn assign(&self, url: &str) -> String {
        let mut tables = self.tables.write();
        let code = self.insert_new(&mut tables, url);
        let _ = tables
            .by_url
            .entry(url.to_string())
            .or_insert_with(|| code.clone());
        code
    }

    /// Return the canonical code for `url`, minting one if needed.
    ///
    /// The boolean is `true` when a new code was created.
    pub fn resolve_or_assign(&self, url: &str) -> (String, bool) {
        if let Some(code) = self.resolve(url) {
            return (code, false);
        }
        let mut tables = self.tables.write();
        // Another writer may have won between the read and write lock.
        if let Some(code) = tables.by_url.get(url) {
            return (code.clone(), false);
        }
        let code = self.insert_new(&mut tables, url);
        let _ = tables.by_url.insert(url.to_string(), code.clone());
        (code, true)
    }

    /// Original URL stored under `code`.
    pub fn lookup(&self, code: &str) -> Result<String, LinkError> {
        self.tables
            .read()
            .by_code
            .get(code)
            .cloned()
            .ok_or(LinkError::NotFound)
    }

    /// Number of stored codes.
    pub fn len(&self) -> usize {
        self.tables.read().by_code.len()
    }

    /// Whether no code has been stored yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert_new(&self, tables: &mut Tables, url: &str) -> String {
        loop {
            let candidate = (self.generate)();
            if tables.by_code.contains_key(&candidate) {
                debug!(code = %candidate, "shortcode collision, regenerating");
                continue;
            }
            let _ = tables.by_code.insert(candidate.clone(), url.to_string());
            return candidate;
        }
    }
}

impl Default for ShortcodeStore {
    fn default() -> Self {
        Self::new(DEFAULT_CODE_LENGTH)
    }
}

/// Random URL-safe code of exactly `len` characters.
pub fn random_code(len: usize) -> String {
    // 3 bytes encode to 4 characters.
    let byte_len = len.div_ceil(4) * 3;
    let bytes: Vec<u8> = (0..byte_len).map(|_| rand::random::<u8>()).collect();
    let mut code = URL_SAFE_NO_PAD.encode(bytes);
    code.truncate(len);
    code
}
