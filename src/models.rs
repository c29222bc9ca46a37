use serde::Serialize;

/// One JMdict `<entry>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    pub ent_seq: u32,
    pub kanji_forms: Vec<KanjiForm>,
    /// Never empty after decoding
    pub readings: Vec<Reading>,
    /// Never empty after decoding
    pub senses: Vec<Sense>,
}

/// `<k_ele>`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KanjiForm {
    pub text: String,
    pub info: Vec<String>,
    pub priority: Vec<String>,
}

/// `<r_ele>`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Reading {
    pub text: String,
    pub no_kanji: bool,
    /// Each item must equal the text of a [`KanjiForm`] of the same entry.
    pub restrictions: Vec<String>,
    pub info: Vec<String>,
    pub priority: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Sense {
    pub kanji_restrictions: Vec<String>,
    pub reading_restrictions: Vec<String>,
    pub parts_of_speech: Vec<String>,
    pub cross_references: Vec<String>,
    pub antonyms: Vec<String>,
    pub fields: Vec<String>,
    pub misc: Vec<String>,
    pub notes: Vec<String>,
    pub loan_sources: Vec<LoanSource>,
    pub dialects: Vec<String>,
    pub glosses: Vec<Gloss>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoanSource {
    pub text: String,
    pub lang: String,
    pub ls_type: Option<String>,
    pub wasei: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Gloss {
    pub text: String,
    pub lang: String,
    pub gender: Option<String>,
    pub g_type: Option<String>,
}

/// One KANJIDIC2 `<character>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Character {
    pub literal: String,
    pub codepoints: Vec<Codepoint>,
    pub radicals: Vec<Radical>,
    pub grade: Option<u32>,
    pub stroke_count: u32,
    /// Common miscounts, from the second and later `<stroke_count>` values
    pub stroke_miscounts: Vec<u32>,
    pub variants: Vec<Variant>,
    pub freq: Option<u32>,
    pub radical_names: Vec<String>,
    pub jlpt: Option<u32>,
    pub dictionary_refs: Vec<DictionaryRef>,
    pub query_codes: Vec<QueryCode>,
    pub reading_meanings: Vec<ReadingMeaningGroup>,
    pub nanori: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Codepoint {
    pub cp_type: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Radical {
    pub rad_type: String,
    pub value: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Variant {
    pub var_type: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DictionaryRef {
    pub dr_type: String,
    pub value: String,
    pub m_vol: Option<String>,
    pub m_page: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueryCode {
    pub qc_type: String,
    pub value: String,
    pub skip_misclass: Option<String>,
}

/// `<rmgroup>`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReadingMeaningGroup {
    pub readings: Vec<CharacterReading>,
    pub meanings: Vec<Meaning>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CharacterReading {
    pub r_type: String,
    pub value: String,
    pub on_type: Option<String>,
    pub r_status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Meaning {
    pub lang: String,
    pub value: String,
}
