//! jmdict-install: JMdict and KANJIDIC2 XML to SQLite
//!
//! This crate decodes the two EDRDG dictionary files and installs them into a
//! normalized relational schema in a single all-or-nothing transaction:
//!
//! 1. **Entity Pass** -- Read only the prolog of the document and collect the
//!    `<!ENTITY>` declarations of its internal DOCTYPE subset
//! 2. **Decoding Pass** -- Stream the document token by token, decoding each
//!    `<entry>` or `<character>` subtree into a typed record with entities expanded
//! 3. **Mapping** -- Flatten each record into parent and child rows, resolving
//!    reading restrictions against the kanji forms of the same entry
//! 4. **Install** -- Run the schema and every row insert inside one transaction;
//!    commit only if all of them succeed
//!
//! # Architecture
//!
//! - **Streaming XML parsing** -- One record in flight at a time; the document tree
//!   is never materialized
//! - **Sink seam** -- The mapper writes through [`mapper::RowSink`], so row ordering
//!   and key wiring are testable without a database
//! - **Single transaction** -- A failure anywhere rolls back the schema and all rows
//!
//! # Key Modules
//!
//! - [`entities`] -- Document-local entity table
//! - [`parser`] -- Streaming record decoder with BZ2 decompression
//! - [`lexicon`] -- JMdict entry decoding
//! - [`kanjidic`] -- KANJIDIC2 character decoding
//! - [`models`] -- Record types (Entry, Sense, Character, ...)
//! - [`mapper`] -- Record to row decomposition
//! - [`schema`] -- Bundled DDL and statement splitting
//! - [`install`] -- Transactional install pipeline over SQLite
//! - [`stats`] -- Per-run row counters
//! - [`error`] -- Error taxonomy
//! - [`config`] -- Constants and JSON install configuration
//!
//! # Example Usage
//!
//! ```bash
//! # Install the lexicon, streaming one entry at a time
//! jmdict-install lexicon -i data/JMdict_e.bz2 -d jmdict.db
//!
//! # Install the kanji dictionary into the same database
//! jmdict-install kanji -i data/kanjidic2.xml -d jmdict.db
//!
//! # Decode only and print the 100th entry as JSON
//! jmdict-install lexicon -i data/JMdict_e --dry-run --show 100
//! ```

pub mod config;
pub mod entities;
pub mod error;
pub mod install;
pub mod kanjidic;
pub mod lexicon;
pub mod mapper;
pub mod models;
pub mod parser;
pub mod schema;
pub mod stats;

pub use error::ImportError;
