//! Flattens decoded records into dependent relational rows.
//!
//! The mapper never talks to a database directly. It issues inserts, parents
//! first and in source field order, against a [`RowSink`] that hands back the
//! generated key of every row. That key is what the child rows reference.
//!
//! # Lexicon rows
//!
//! ```text
//! entry ─┬─ kanji_form ─┬─ kanji_form_info
//!        │              └─ kanji_form_priority
//!        ├─ reading ────┬─ reading_restriction ── (kanji_form)
//!        │              ├─ reading_info
//!        │              └─ reading_priority
//!        └─ sense ──────┬─ sense_kanji_restriction, sense_reading_restriction,
//!                       ├─ sense_pos, sense_xref, sense_antonym, sense_field,
//!                       ├─ sense_misc, sense_note, sense_loan_source, sense_dialect
//!                       └─ gloss
//! ```

use crate::config::XREF_DELIMITER;
use crate::error::ImportError;
use crate::models::{Character, Entry};
use rustc_hash::FxHashMap;
use std::fmt;

/// Every table the mapper writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    Entry,
    KanjiForm,
    KanjiFormInfo,
    KanjiFormPriority,
    Reading,
    ReadingRestriction,
    ReadingInfo,
    ReadingPriority,
    Sense,
    SenseKanjiRestriction,
    SenseReadingRestriction,
    SensePos,
    SenseXref,
    SenseAntonym,
    SenseField,
    SenseMisc,
    SenseNote,
    SenseLoanSource,
    SenseDialect,
    Gloss,
    Kanji,
    KanjiCodepoint,
    KanjiRadical,
    KanjiStrokeMiscount,
    KanjiVariant,
    KanjiRadicalName,
    KanjiDicRef,
    KanjiQueryCode,
    KanjiRmGroup,
    KanjiReading,
    KanjiMeaning,
    KanjiNanori,
}

impl Table {
    pub fn name(self) -> &'static str {
        match self {
            Table::Entry => "entry",
            Table::KanjiForm => "kanji_form",
            Table::KanjiFormInfo => "kanji_form_info",
            Table::KanjiFormPriority => "kanji_form_priority",
            Table::Reading => "reading",
            Table::ReadingRestriction => "reading_restriction",
            Table::ReadingInfo => "reading_info",
            Table::ReadingPriority => "reading_priority",
            Table::Sense => "sense",
            Table::SenseKanjiRestriction => "sense_kanji_restriction",
            Table::SenseReadingRestriction => "sense_reading_restriction",
            Table::SensePos => "sense_pos",
            Table::SenseXref => "sense_xref",
            Table::SenseAntonym => "sense_antonym",
            Table::SenseField => "sense_field",
            Table::SenseMisc => "sense_misc",
            Table::SenseNote => "sense_note",
            Table::SenseLoanSource => "sense_loan_source",
            Table::SenseDialect => "sense_dialect",
            Table::Gloss => "gloss",
            Table::Kanji => "kanji",
            Table::KanjiCodepoint => "kanji_codepoint",
            Table::KanjiRadical => "kanji_radical",
            Table::KanjiStrokeMiscount => "kanji_stroke_miscount",
            Table::KanjiVariant => "kanji_variant",
            Table::KanjiRadicalName => "kanji_radical_name",
            Table::KanjiDicRef => "kanji_dic_ref",
            Table::KanjiQueryCode => "kanji_query_code",
            Table::KanjiRmGroup => "kanji_rm_group",
            Table::KanjiReading => "kanji_reading",
            Table::KanjiMeaning => "kanji_meaning",
            Table::KanjiNanori => "kanji_nanori",
        }
    }

    /// Parameterized INSERT matching the column order the mapper passes values in.
    pub fn insert_sql(self) -> &'static str {
        match self {
            Table::Entry => "INSERT INTO entry (ent_seq) VALUES (?1)",
            Table::KanjiForm => "INSERT INTO kanji_form (entry_id, text) VALUES (?1, ?2)",
            Table::KanjiFormInfo => {
                "INSERT INTO kanji_form_info (kanji_form_id, tag) VALUES (?1, ?2)"
            }
            Table::KanjiFormPriority => {
                "INSERT INTO kanji_form_priority (kanji_form_id, tag) VALUES (?1, ?2)"
            }
            Table::Reading => {
                "INSERT INTO reading (entry_id, text, no_kanji) VALUES (?1, ?2, ?3)"
            }
            Table::ReadingRestriction => {
                "INSERT INTO reading_restriction (reading_id, kanji_form_id) VALUES (?1, ?2)"
            }
            Table::ReadingInfo => "INSERT INTO reading_info (reading_id, tag) VALUES (?1, ?2)",
            Table::ReadingPriority => {
                "INSERT INTO reading_priority (reading_id, tag) VALUES (?1, ?2)"
            }
            Table::Sense => "INSERT INTO sense (entry_id) VALUES (?1)",
            Table::SenseKanjiRestriction => {
                "INSERT INTO sense_kanji_restriction (sense_id, text) VALUES (?1, ?2)"
            }
            Table::SenseReadingRestriction => {
                "INSERT INTO sense_reading_restriction (sense_id, text) VALUES (?1, ?2)"
            }
            Table::SensePos => "INSERT INTO sense_pos (sense_id, tag) VALUES (?1, ?2)",
            Table::SenseXref => "INSERT INTO sense_xref (sense_id, target) VALUES (?1, ?2)",
            Table::SenseAntonym => "INSERT INTO sense_antonym (sense_id, target) VALUES (?1, ?2)",
            Table::SenseField => "INSERT INTO sense_field (sense_id, tag) VALUES (?1, ?2)",
            Table::SenseMisc => "INSERT INTO sense_misc (sense_id, tag) VALUES (?1, ?2)",
            Table::SenseNote => "INSERT INTO sense_note (sense_id, text) VALUES (?1, ?2)",
            Table::SenseLoanSource => {
                "INSERT INTO sense_loan_source (sense_id, text, lang, ls_type, wasei) \
                 VALUES (?1, ?2, ?3, ?4, ?5)"
            }
            Table::SenseDialect => "INSERT INTO sense_dialect (sense_id, tag) VALUES (?1, ?2)",
            Table::Gloss => {
                "INSERT INTO gloss (sense_id, text, lang, gender, g_type) \
                 VALUES (?1, ?2, ?3, ?4, ?5)"
            }
            Table::Kanji => {
                "INSERT INTO kanji (literal, grade, stroke_count, freq, jlpt) \
                 VALUES (?1, ?2, ?3, ?4, ?5)"
            }
            Table::KanjiCodepoint => {
                "INSERT INTO kanji_codepoint (kanji_id, cp_type, value) VALUES (?1, ?2, ?3)"
            }
            Table::KanjiRadical => {
                "INSERT INTO kanji_radical (kanji_id, rad_type, value) VALUES (?1, ?2, ?3)"
            }
            Table::KanjiStrokeMiscount => {
                "INSERT INTO kanji_stroke_miscount (kanji_id, stroke_count) VALUES (?1, ?2)"
            }
            Table::KanjiVariant => {
                "INSERT INTO kanji_variant (kanji_id, var_type, value) VALUES (?1, ?2, ?3)"
            }
            Table::KanjiRadicalName => {
                "INSERT INTO kanji_radical_name (kanji_id, name) VALUES (?1, ?2)"
            }
            Table::KanjiDicRef => {
                "INSERT INTO kanji_dic_ref (kanji_id, dr_type, value, m_vol, m_page) \
                 VALUES (?1, ?2, ?3, ?4, ?5)"
            }
            Table::KanjiQueryCode => {
                "INSERT INTO kanji_query_code (kanji_id, qc_type, value, skip_misclass) \
                 VALUES (?1, ?2, ?3, ?4)"
            }
            Table::KanjiRmGroup => "INSERT INTO kanji_rm_group (kanji_id) VALUES (?1)",
            Table::KanjiReading => {
                "INSERT INTO kanji_reading (group_id, r_type, value, on_type, r_status) \
                 VALUES (?1, ?2, ?3, ?4, ?5)"
            }
            Table::KanjiMeaning => {
                "INSERT INTO kanji_meaning (group_id, lang, value) VALUES (?1, ?2, ?3)"
            }
            Table::KanjiNanori => "INSERT INTO kanji_nanori (kanji_id, value) VALUES (?1, ?2)",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One column value of a row insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value<'a> {
    Integer(i64),
    Bool(bool),
    Text(&'a str),
    Null,
}

impl<'a> Value<'a> {
    pub fn opt_text(value: Option<&'a str>) -> Self {
        value.map_or(Value::Null, Value::Text)
    }

    pub fn opt_integer(value: Option<u32>) -> Self {
        value.map_or(Value::Null, |v| Value::Integer(i64::from(v)))
    }
}

/// Destination of row inserts; returns the generated key of each row.
pub trait RowSink {
    type Error: std::error::Error + Send + Sync + 'static;

    fn insert(&mut self, table: Table, values: &[Value<'_>]) -> Result<i64, Self::Error>;
}

/// Printable identity of the record a row belongs to, for error context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKey<'a> {
    Entry(u32),
    Character(&'a str),
}

impl fmt::Display for RecordKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKey::Entry(seq) => write!(f, "entry {seq}"),
            RecordKey::Character(literal) => write!(f, "character {literal}"),
        }
    }
}

/// A decoded record that knows how to persist itself through a [`RowSink`].
pub trait RelationalRecord {
    fn key(&self) -> RecordKey<'_>;

    /// Inserts all rows of the record and returns the key of its top-level row.
    fn persist<S: RowSink>(&self, sink: &mut S) -> Result<i64, ImportError>;
}

impl RelationalRecord for Entry {
    fn key(&self) -> RecordKey<'_> {
        RecordKey::Entry(self.ent_seq)
    }

    fn persist<S: RowSink>(&self, sink: &mut S) -> Result<i64, ImportError> {
        map_entry(self, sink)
    }
}

impl RelationalRecord for Character {
    fn key(&self) -> RecordKey<'_> {
        RecordKey::Character(&self.literal)
    }

    fn persist<S: RowSink>(&self, sink: &mut S) -> Result<i64, ImportError> {
        map_character(self, sink)
    }
}

struct Inserter<'s, 'k, S> {
    sink: &'s mut S,
    key: RecordKey<'k>,
}

impl<S: RowSink> Inserter<'_, '_, S> {
    fn row(&mut self, table: Table, values: &[Value<'_>]) -> Result<i64, ImportError> {
        self.sink
            .insert(table, values)
            .map_err(|source| ImportError::RowInsertFailure {
                table: table.name(),
                record: self.key.to_string(),
                source: Box::new(source),
            })
    }

    /// One `(parent, value)` row per item.
    fn tags<T: AsRef<str>>(
        &mut self,
        table: Table,
        parent: i64,
        items: &[T],
    ) -> Result<(), ImportError> {
        for item in items {
            self.row(table, &[Value::Integer(parent), Value::Text(item.as_ref())])?;
        }
        Ok(())
    }
}

/// Reference target kept for a cross-reference: everything before the first
/// center dot. Reading and sense number parts are dropped.
pub fn xref_target(xref: &str) -> &str {
    xref.split_once(XREF_DELIMITER)
        .map_or(xref, |(target, _)| target)
}

/// Writes one entry. Fails on the first rejected insert or unresolved reading
/// restriction, leaving the caller to roll back.
pub fn map_entry<S: RowSink>(entry: &Entry, sink: &mut S) -> Result<i64, ImportError> {
    let mut rows = Inserter {
        sink,
        key: entry.key(),
    };

    let entry_id = rows.row(Table::Entry, &[Value::Integer(i64::from(entry.ent_seq))])?;

    let mut kanji_ids: FxHashMap<&str, i64> = FxHashMap::default();
    for form in &entry.kanji_forms {
        let kanji_id = rows.row(
            Table::KanjiForm,
            &[Value::Integer(entry_id), Value::Text(&form.text)],
        )?;
        kanji_ids.insert(form.text.as_str(), kanji_id);
        rows.tags(Table::KanjiFormInfo, kanji_id, &form.info)?;
        rows.tags(Table::KanjiFormPriority, kanji_id, &form.priority)?;
    }

    for reading in &entry.readings {
        let reading_id = rows.row(
            Table::Reading,
            &[
                Value::Integer(entry_id),
                Value::Text(&reading.text),
                Value::Bool(reading.no_kanji),
            ],
        )?;

        for restriction in &reading.restrictions {
            let kanji_id = *kanji_ids.get(restriction.as_str()).ok_or_else(|| {
                ImportError::ReferentialIntegrityFailure {
                    record: rows.key.to_string(),
                    restriction: restriction.clone(),
                }
            })?;
            rows.row(
                Table::ReadingRestriction,
                &[Value::Integer(reading_id), Value::Integer(kanji_id)],
            )?;
        }
        rows.tags(Table::ReadingInfo, reading_id, &reading.info)?;
        rows.tags(Table::ReadingPriority, reading_id, &reading.priority)?;
    }

    for sense in &entry.senses {
        let sense_id = rows.row(Table::Sense, &[Value::Integer(entry_id)])?;

        rows.tags(Table::SenseKanjiRestriction, sense_id, &sense.kanji_restrictions)?;
        rows.tags(Table::SenseReadingRestriction, sense_id, &sense.reading_restrictions)?;
        rows.tags(Table::SensePos, sense_id, &sense.parts_of_speech)?;
        for xref in &sense.cross_references {
            rows.row(
                Table::SenseXref,
                &[Value::Integer(sense_id), Value::Text(xref_target(xref))],
            )?;
        }
        rows.tags(Table::SenseAntonym, sense_id, &sense.antonyms)?;
        rows.tags(Table::SenseField, sense_id, &sense.fields)?;
        rows.tags(Table::SenseMisc, sense_id, &sense.misc)?;
        rows.tags(Table::SenseNote, sense_id, &sense.notes)?;
        for source in &sense.loan_sources {
            rows.row(
                Table::SenseLoanSource,
                &[
                    Value::Integer(sense_id),
                    Value::Text(&source.text),
                    Value::Text(&source.lang),
                    Value::opt_text(source.ls_type.as_deref()),
                    Value::Bool(source.wasei),
                ],
            )?;
        }
        rows.tags(Table::SenseDialect, sense_id, &sense.dialects)?;
        for gloss in &sense.glosses {
            rows.row(
                Table::Gloss,
                &[
                    Value::Integer(sense_id),
                    Value::Text(&gloss.text),
                    Value::Text(&gloss.lang),
                    Value::opt_text(gloss.gender.as_deref()),
                    Value::opt_text(gloss.g_type.as_deref()),
                ],
            )?;
        }
    }

    Ok(entry_id)
}

pub fn map_character<S: RowSink>(character: &Character, sink: &mut S) -> Result<i64, ImportError> {
    let mut rows = Inserter {
        sink,
        key: character.key(),
    };

    let kanji_id = rows.row(
        Table::Kanji,
        &[
            Value::Text(&character.literal),
            Value::opt_integer(character.grade),
            Value::Integer(i64::from(character.stroke_count)),
            Value::opt_integer(character.freq),
            Value::opt_integer(character.jlpt),
        ],
    )?;
    let id = Value::Integer(kanji_id);

    for cp in &character.codepoints {
        rows.row(
            Table::KanjiCodepoint,
            &[id, Value::Text(&cp.cp_type), Value::Text(&cp.value)],
        )?;
    }
    for radical in &character.radicals {
        rows.row(
            Table::KanjiRadical,
            &[
                id,
                Value::Text(&radical.rad_type),
                Value::Integer(i64::from(radical.value)),
            ],
        )?;
    }
    for strokes in &character.stroke_miscounts {
        rows.row(
            Table::KanjiStrokeMiscount,
            &[id, Value::Integer(i64::from(*strokes))],
        )?;
    }
    for variant in &character.variants {
        rows.row(
            Table::KanjiVariant,
            &[id, Value::Text(&variant.var_type), Value::Text(&variant.value)],
        )?;
    }
    rows.tags(Table::KanjiRadicalName, kanji_id, &character.radical_names)?;
    for dic in &character.dictionary_refs {
        rows.row(
            Table::KanjiDicRef,
            &[
                id,
                Value::Text(&dic.dr_type),
                Value::Text(&dic.value),
                Value::opt_text(dic.m_vol.as_deref()),
                Value::opt_text(dic.m_page.as_deref()),
            ],
        )?;
    }
    for code in &character.query_codes {
        rows.row(
            Table::KanjiQueryCode,
            &[
                id,
                Value::Text(&code.qc_type),
                Value::Text(&code.value),
                Value::opt_text(code.skip_misclass.as_deref()),
            ],
        )?;
    }
    for group in &character.reading_meanings {
        let group_id = rows.row(Table::KanjiRmGroup, &[id])?;
        for reading in &group.readings {
            rows.row(
                Table::KanjiReading,
                &[
                    Value::Integer(group_id),
                    Value::Text(&reading.r_type),
                    Value::Text(&reading.value),
                    Value::opt_text(reading.on_type.as_deref()),
                    Value::opt_text(reading.r_status.as_deref()),
                ],
            )?;
        }
        for meaning in &group.meanings {
            rows.row(
                Table::KanjiMeaning,
                &[
                    Value::Integer(group_id),
                    Value::Text(&meaning.lang),
                    Value::Text(&meaning.value),
                ],
            )?;
        }
    }
    rows.tags(Table::KanjiNanori, kanji_id, &character.nanori)?;

    Ok(kanji_id)
}
