//! Document-local entity table.
//!
//! JMdict abbreviates its tag values with hundreds of `<!ENTITY>` declarations
//! in the internal DOCTYPE subset (`&n;`, `&adj-no;`, ...). An XML reader that only
//! knows the five predefined entities fails on the first of them, so the table is
//! collected in a separate pass that looks at nothing but the prolog.
//!
//! The prolog pass also cuts the DOCTYPE out of the stream handed to the record
//! decoder. Its end is found with quotes and comments taken into account, so a
//! `>` inside an entity value or a DTD comment does not end it early.

use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashMap;
use std::io::{self, BufRead};
use tracing::debug;

static ENTITY_DECL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<!ENTITY\s+(\S+)\s+"([^"]*)"\s*>"#).unwrap());

static DTD_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());

const DOCTYPE_OPEN: &[u8] = b"<!DOCTYPE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scan {
    Head,
    HeadComment,
    Doctype,
    DoctypeComment,
    DoctypeQuote(u8),
    Done,
}

/// Byte-at-a-time splitter of the document prolog.
struct PrologScanner {
    head: Vec<u8>,
    doctype: Vec<u8>,
    state: Scan,
    subset: bool,
}

impl PrologScanner {
    fn new() -> Self {
        Self {
            head: Vec::new(),
            doctype: Vec::new(),
            state: Scan::Head,
            subset: false,
        }
    }

    /// Feeds one byte; returns true once the prolog is complete.
    fn push(&mut self, b: u8) -> bool {
        match self.state {
            Scan::Head => {
                self.head.push(b);
                if self.head.ends_with(b"<!--") {
                    self.state = Scan::HeadComment;
                } else if self.head.ends_with(DOCTYPE_OPEN) {
                    self.head.truncate(self.head.len() - DOCTYPE_OPEN.len());
                    self.doctype.extend_from_slice(DOCTYPE_OPEN);
                    self.state = Scan::Doctype;
                } else if starts_element(&self.head) {
                    self.state = Scan::Done;
                }
            }
            Scan::HeadComment => {
                self.head.push(b);
                if self.head.ends_with(b"-->") {
                    self.state = Scan::Head;
                }
            }
            Scan::Doctype => {
                self.doctype.push(b);
                match b {
                    b'"' | b'\'' => self.state = Scan::DoctypeQuote(b),
                    b'[' => self.subset = true,
                    b']' => self.subset = false,
                    b'>' if !self.subset => self.state = Scan::Done,
                    _ if self.doctype.ends_with(b"<!--") => self.state = Scan::DoctypeComment,
                    _ => {}
                }
            }
            Scan::DoctypeComment => {
                self.doctype.push(b);
                if self.doctype.ends_with(b"-->") {
                    self.state = Scan::Doctype;
                }
            }
            Scan::DoctypeQuote(quote) => {
                self.doctype.push(b);
                if b == quote {
                    self.state = Scan::Doctype;
                }
            }
            Scan::Done => {}
        }
        self.state == Scan::Done
    }

    fn finish(mut self) -> Prolog {
        if self.state == Scan::Done && !self.doctype.is_empty() {
            // same length as the declaration, so byte positions stay valid
            self.head.resize(self.head.len() + self.doctype.len(), b' ');
            Prolog {
                head: self.head,
                doctype: Some(String::from_utf8_lossy(&self.doctype).into_owned()),
            }
        } else {
            // unterminated DOCTYPE: hand it to the decoder unchanged to report
            self.head.extend_from_slice(&self.doctype);
            Prolog {
                head: self.head,
                doctype: None,
            }
        }
    }
}

/// `<` followed by a name start character: the root element has begun.
fn starts_element(head: &[u8]) -> bool {
    match head {
        [.., b'<', c] => c.is_ascii_alphabetic() || *c == b'_' || *c == b':' || *c >= 0x80,
        _ => false,
    }
}

/// The leading bytes of a document, up to and including the start of the root
/// element, with the DOCTYPE declaration blanked out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prolog {
    /// Bytes the record decoder must see before the rest of the stream.
    pub head: Vec<u8>,
    /// The full `<!DOCTYPE ...>` text, if the document has one.
    pub doctype: Option<String>,
}

impl Prolog {
    /// Consumes exactly the prolog from `source`; the rest stays unread.
    pub fn read<R: BufRead>(source: &mut R) -> io::Result<Self> {
        let mut scanner = PrologScanner::new();
        loop {
            let (used, done) = {
                let buf = source.fill_buf()?;
                if buf.is_empty() {
                    return Ok(scanner.finish());
                }
                let mut used = 0;
                let mut done = false;
                for &b in buf {
                    used += 1;
                    if scanner.push(b) {
                        done = true;
                        break;
                    }
                }
                (used, done)
            };
            source.consume(used);
            if done {
                return Ok(scanner.finish());
            }
        }
    }

    /// Splits an in-memory document into its prolog and the remaining bytes.
    pub fn split(bytes: &[u8]) -> (Self, &[u8]) {
        let mut scanner = PrologScanner::new();
        for (i, &b) in bytes.iter().enumerate() {
            if scanner.push(b) {
                return (scanner.finish(), &bytes[i + 1..]);
            }
        }
        (scanner.finish(), &[])
    }

    pub fn entities(&self) -> EntityTable {
        let mut table = EntityTable::new();
        if let Some(doctype) = &self.doctype {
            table.extend_from_declarations(doctype);
        }
        debug!(entities = table.len(), "Entity table built");
        table
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityTable {
    entities: FxHashMap<String, String>,
}

impl EntityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the table from an in-memory document. A document without a
    /// DOCTYPE yields an empty table.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Prolog::split(bytes).0.entities()
    }

    /// Adds every declaration found in a DOCTYPE body, ignoring commented-out
    /// ones. Later declarations of the same name replace earlier ones.
    pub fn extend_from_declarations(&mut self, doctype: &str) {
        let live = DTD_COMMENT.replace_all(doctype, "");
        for caps in ENTITY_DECL.captures_iter(&live) {
            self.entities.insert(caps[1].to_string(), caps[2].to_string());
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entities.insert(name.into(), value.into());
    }

    /// Declared value only, without the predefined entities.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entities.get(name).map(String::as_str)
    }

    /// Replacement text for `&name;`.
    pub fn resolve(&self, name: &str) -> Option<&str> {
        match name {
            "lt" => Some("<"),
            "gt" => Some(">"),
            "amp" => Some("&"),
            "apos" => Some("'"),
            "quot" => Some("\""),
            _ => self.get(name),
        }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE JMdict [
<!ELEMENT JMdict (entry*)>
<!-- <pos> entities -->
<!ENTITY adj-no "nouns which may take the genitive case particle 'no'">
<!ENTITY n "noun (common) (futsuumeishi)">
<!ATTLIST gloss xml:lang CDATA "eng">
]>
<JMdict><entry><pos>&n;</pos><pos>&undeclared;</pos></entry></JMdict>"#;

    #[test]
    fn collects_declarations_from_doctype() {
        let table = EntityTable::from_bytes(DOC.as_bytes());
        assert_eq!(table.len(), 2);
        assert_eq!(table.get("n"), Some("noun (common) (futsuumeishi)"));
        assert_eq!(
            table.get("adj-no"),
            Some("nouns which may take the genitive case particle 'no'")
        );
    }

    #[test]
    fn tolerates_undeclared_entities_in_content() {
        // the body references &undeclared; which the prolog pass never looks at
        let table = EntityTable::from_bytes(DOC.as_bytes());
        assert!(table.get("undeclared").is_none());
    }

    #[test]
    fn no_doctype_is_empty_table() {
        let table = EntityTable::from_bytes(b"<kanjidic2><character/></kanjidic2>");
        assert!(table.is_empty());
    }

    #[test]
    fn doctype_without_entities_is_empty_table() {
        let doc = r#"<!DOCTYPE kanjidic2 [<!ELEMENT kanjidic2 (character*)>]><kanjidic2/>"#;
        assert!(EntityTable::from_bytes(doc.as_bytes()).is_empty());
    }

    #[test]
    fn empty_input_is_empty_table() {
        assert!(EntityTable::from_bytes(b"").is_empty());
    }

    #[test]
    fn resolves_predefined_entities() {
        let table = EntityTable::new();
        assert_eq!(table.resolve("amp"), Some("&"));
        assert_eq!(table.resolve("lt"), Some("<"));
        assert_eq!(table.resolve("quot"), Some("\""));
        assert_eq!(table.resolve("n"), None);
    }

    #[test]
    fn resolve_falls_back_to_declared() {
        let mut table = EntityTable::new();
        table.insert("vs", "noun or participle which takes the aux. verb suru");
        assert_eq!(
            table.resolve("vs"),
            Some("noun or participle which takes the aux. verb suru")
        );
    }

    #[test]
    fn later_declaration_wins() {
        let mut table = EntityTable::new();
        table.extend_from_declarations(r#"<!ENTITY x "first"> <!ENTITY x "second">"#);
        assert_eq!(table.get("x"), Some("second"));
    }

    #[test]
    fn ignores_external_declarations() {
        let mut table = EntityTable::new();
        table.extend_from_declarations(r#"<!ENTITY ext SYSTEM "ext.txt">"#);
        assert!(table.is_empty());
    }

    #[test]
    fn gt_inside_entity_value_stays_in_doctype() {
        let doc = r#"<!DOCTYPE d [<!ENTITY gt5 "a > b"><!ENTITY n "noun">]><d/>"#;
        let table = EntityTable::from_bytes(doc.as_bytes());
        assert_eq!(table.get("gt5"), Some("a > b"));
        assert_eq!(table.get("n"), Some("noun"));
    }

    #[test]
    fn gt_inside_dtd_comment_stays_in_doctype() {
        let doc = "<!DOCTYPE d [\n<!-- a -> b -->\n<!ENTITY n \"noun\">\n]><d/>";
        let table = EntityTable::from_bytes(doc.as_bytes());
        assert_eq!(table.get("n"), Some("noun"));
    }

    #[test]
    fn commented_out_declarations_are_ignored() {
        let doc = r#"<!DOCTYPE d [<!-- <!ENTITY old "gone"> --><!ENTITY n "noun">]><d/>"#;
        let table = EntityTable::from_bytes(doc.as_bytes());
        assert!(table.get("old").is_none());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn prolog_blanks_doctype_and_keeps_length() {
        let doc = r#"<?xml version="1.0"?><!DOCTYPE d [<!ENTITY n "x > y">]><d><e/></d>"#;
        let (prolog, rest) = Prolog::split(doc.as_bytes());
        let doctype = prolog.doctype.as_deref().unwrap();
        assert_eq!(doctype, r#"<!DOCTYPE d [<!ENTITY n "x > y">]>"#);
        assert_eq!(prolog.head.len() + rest.len(), doc.len());
        assert!(prolog.head.starts_with(br#"<?xml version="1.0"?>"#));
        assert!(prolog.head.ends_with(b" <d"));
        assert_eq!(rest, b"><e/></d>");
    }

    #[test]
    fn prolog_read_leaves_body_unread() {
        let doc = r#"<!-- <!DOCTYPE fake> --><!DOCTYPE d [<!ENTITY n "noun">]><d>body</d>"#;
        let mut source = doc.as_bytes();
        let prolog = Prolog::read(&mut source).unwrap();
        assert_eq!(prolog.entities().get("n"), Some("noun"));
        assert!(prolog.doctype.unwrap().starts_with("<!DOCTYPE d"));
        assert_eq!(source, b">body</d>");
    }

    #[test]
    fn unterminated_doctype_is_passed_through() {
        let doc = r#"<!DOCTYPE d [<!ENTITY n "noun">"#;
        let (prolog, rest) = Prolog::split(doc.as_bytes());
        assert!(prolog.doctype.is_none());
        assert_eq!(prolog.head, doc.as_bytes());
        assert!(rest.is_empty());
    }
}
