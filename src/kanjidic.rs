//! KANJIDIC2 `<character>` decoding.

use crate::config::DEFAULT_MEANING_LANG;
use crate::error::{DecodeError, ImportError};
use crate::models::{
    Character, CharacterReading, Codepoint, DictionaryRef, Meaning, QueryCode, Radical,
    ReadingMeaningGroup, Variant,
};
use crate::parser::{Child, Element, Record, StreamingRecordDecoder};
use std::io::BufRead;
use std::path::Path;

pub type CharacterDecoder<R> = StreamingRecordDecoder<R, Character>;

impl Record for Character {
    const ELEMENT: &'static str = "character";

    fn decode<R: BufRead>(element: &mut Element<'_, R>) -> Result<Self, DecodeError> {
        let mut literal = None;
        let mut strokes = Vec::new();
        let mut character = Character::default();

        while let Some(child) = element.next_child()? {
            match child.name() {
                "literal" => literal = Some(element.text(&child)?),
                "codepoint" => {
                    let mut group = element.enter(&child);
                    while let Some(cp) = group.next_child()? {
                        if cp.name() != "cp_value" {
                            group.skip(&cp)?;
                            continue;
                        }
                        let cp_type = required_attr(&cp, "cp_type")?;
                        let value = group.text(&cp)?;
                        character.codepoints.push(Codepoint { cp_type, value });
                    }
                }
                "radical" => {
                    let mut group = element.enter(&child);
                    while let Some(rad) = group.next_child()? {
                        if rad.name() != "rad_value" {
                            group.skip(&rad)?;
                            continue;
                        }
                        let rad_type = required_attr(&rad, "rad_type")?;
                        let value = group.number(&rad)?;
                        character.radicals.push(Radical { rad_type, value });
                    }
                }
                "misc" => decode_misc(&mut element.enter(&child), &mut character, &mut strokes)?,
                "dic_number" => {
                    let mut group = element.enter(&child);
                    while let Some(dic) = group.next_child()? {
                        if dic.name() != "dic_ref" {
                            group.skip(&dic)?;
                            continue;
                        }
                        let dr_type = required_attr(&dic, "dr_type")?;
                        let m_vol = dic.attr("m_vol").map(str::to_string);
                        let m_page = dic.attr("m_page").map(str::to_string);
                        let value = group.text(&dic)?;
                        character.dictionary_refs.push(DictionaryRef {
                            dr_type,
                            value,
                            m_vol,
                            m_page,
                        });
                    }
                }
                "query_code" => {
                    let mut group = element.enter(&child);
                    while let Some(q) = group.next_child()? {
                        if q.name() != "q_code" {
                            group.skip(&q)?;
                            continue;
                        }
                        let qc_type = required_attr(&q, "qc_type")?;
                        let skip_misclass = q.attr("skip_misclass").map(str::to_string);
                        let value = group.text(&q)?;
                        character.query_codes.push(QueryCode {
                            qc_type,
                            value,
                            skip_misclass,
                        });
                    }
                }
                "reading_meaning" => {
                    decode_reading_meaning(&mut element.enter(&child), &mut character)?
                }
                _ => element.skip(&child)?,
            }
        }

        character.literal = literal.ok_or_else(|| DecodeError::missing("literal", "character"))?;
        let mut strokes = strokes.into_iter();
        character.stroke_count = strokes.next().ok_or_else(|| {
            DecodeError::Invalid(format!(
                "character {} has no <stroke_count>",
                character.literal
            ))
        })?;
        character.stroke_miscounts = strokes.collect();
        Ok(character)
    }
}

fn required_attr(child: &Child, name: &str) -> Result<String, DecodeError> {
    child.attr(name).map(str::to_string).ok_or_else(|| {
        DecodeError::Invalid(format!("<{}> has no {name} attribute", child.name()))
    })
}

fn decode_misc<R: BufRead>(
    element: &mut Element<'_, R>,
    character: &mut Character,
    strokes: &mut Vec<u32>,
) -> Result<(), DecodeError> {
    while let Some(child) = element.next_child()? {
        match child.name() {
            "grade" => character.grade = Some(element.number(&child)?),
            "stroke_count" => strokes.push(element.number(&child)?),
            "variant" => {
                let var_type = required_attr(&child, "var_type")?;
                let value = element.text(&child)?;
                character.variants.push(Variant { var_type, value });
            }
            "freq" => character.freq = Some(element.number(&child)?),
            "rad_name" => character.radical_names.push(element.text(&child)?),
            "jlpt" => character.jlpt = Some(element.number(&child)?),
            _ => element.skip(&child)?,
        }
    }
    Ok(())
}

fn decode_reading_meaning<R: BufRead>(
    element: &mut Element<'_, R>,
    character: &mut Character,
) -> Result<(), DecodeError> {
    while let Some(child) = element.next_child()? {
        match child.name() {
            "rmgroup" => {
                let mut rmgroup = ReadingMeaningGroup::default();
                let mut group = element.enter(&child);
                while let Some(item) = group.next_child()? {
                    match item.name() {
                        "reading" => {
                            let r_type = required_attr(&item, "r_type")?;
                            let on_type = item.attr("on_type").map(str::to_string);
                            let r_status = item.attr("r_status").map(str::to_string);
                            let value = group.text(&item)?;
                            rmgroup.readings.push(CharacterReading {
                                r_type,
                                value,
                                on_type,
                                r_status,
                            });
                        }
                        "meaning" => {
                            let lang = item.attr("m_lang").unwrap_or(DEFAULT_MEANING_LANG);
                            let lang = lang.to_string();
                            let value = group.text(&item)?;
                            rmgroup.meanings.push(Meaning { lang, value });
                        }
                        _ => group.skip(&item)?,
                    }
                }
                character.reading_meanings.push(rmgroup);
            }
            "nanori" => character.nanori.push(element.text(&child)?),
            _ => element.skip(&child)?,
        }
    }
    Ok(())
}

/// Streams characters from a KANJIDIC2 file without materialising them.
pub fn open_characters(path: &Path) -> Result<CharacterDecoder<Box<dyn BufRead>>, ImportError> {
    CharacterDecoder::open(path)
}

/// Decodes every character of a KANJIDIC2 file into memory.
pub fn load_characters(path: &Path) -> Result<Vec<Character>, ImportError> {
    open_characters(path)?.collect()
}

pub fn decode_characters(bytes: &[u8]) -> Result<Vec<Character>, ImportError> {
    CharacterDecoder::from_bytes(bytes).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const KANJI_XML: &str = r#"<kanjidic2><header><file_version>4</file_version></header><!-- Entry for Kanji: 本 --><character><literal>本</literal><codepoint><cp_value cp_type="ucs">672c</cp_value><cp_value cp_type="jis208">43-60</cp_value></codepoint><radical><rad_value rad_type="classical">75</rad_value><rad_value rad_type="nelson_c">2</rad_value></radical><misc><grade>1</grade><stroke_count>5</stroke_count><variant var_type="jis208">52-81</variant><freq>10</freq><jlpt>4</jlpt></misc><dic_number><dic_ref dr_type="nelson_c">96</dic_ref><dic_ref dr_type="moro" m_vol="6" m_page="0026">14421</dic_ref><dic_ref dr_type="busy_people">2.1</dic_ref></dic_number><query_code><q_code qc_type="skip">4-5-3</q_code><q_code qc_type="four_corner">5023.0</q_code></query_code><reading_meaning><rmgroup><reading r_type="pinyin">ben3</reading><reading r_type="ja_on">ホン</reading><reading r_type="ja_kun">もと</reading><meaning>book</meaning><meaning>present</meaning><meaning m_lang="fr">livre</meaning><meaning m_lang="es">libro</meaning></rmgroup><nanori>まと</nanori></reading_meaning></character></kanjidic2>"#;

    #[test]
    fn decodes_sample_character() {
        let characters = decode_characters(KANJI_XML.as_bytes()).unwrap();
        assert_eq!(characters.len(), 1);

        let c = &characters[0];
        assert_eq!(c.literal, "本");
        assert_eq!(c.grade, Some(1));
        assert_eq!(c.stroke_count, 5);
        assert_eq!(c.freq, Some(10));
        assert_eq!(c.jlpt, Some(4));
        assert!(c.stroke_miscounts.is_empty());
    }

    #[test]
    fn decodes_tagged_value_sets() {
        let characters = decode_characters(KANJI_XML.as_bytes()).unwrap();
        let c = &characters[0];
        assert_eq!(
            c.codepoints[0],
            Codepoint {
                cp_type: "ucs".to_string(),
                value: "672c".to_string()
            }
        );
        assert_eq!(c.radicals.len(), 2);
        assert_eq!(c.radicals[0].value, 75);
        assert_eq!(c.variants[0].var_type, "jis208");
        assert_eq!(c.dictionary_refs.len(), 3);
        assert_eq!(c.dictionary_refs[1].m_vol.as_deref(), Some("6"));
        assert_eq!(c.dictionary_refs[1].m_page.as_deref(), Some("0026"));
        assert_eq!(c.dictionary_refs[2].value, "2.1");
        assert_eq!(c.query_codes[0].value, "4-5-3");
    }

    #[test]
    fn decodes_reading_meaning_groups() {
        let characters = decode_characters(KANJI_XML.as_bytes()).unwrap();
        let c = &characters[0];
        assert_eq!(c.reading_meanings.len(), 1);
        let group = &c.reading_meanings[0];
        assert_eq!(group.readings.len(), 3);
        assert_eq!(group.readings[1].r_type, "ja_on");
        assert_eq!(group.readings[1].value, "ホン");
        assert_eq!(group.meanings[0].lang, "en");
        assert_eq!(group.meanings[2].lang, "fr");
        assert_eq!(group.meanings[2].value, "livre");
        assert_eq!(c.nanori, vec!["まと"]);
    }

    #[test]
    fn extra_stroke_counts_are_miscounts() {
        let xml = r#"<kanjidic2><character><literal>亜</literal>
            <misc><stroke_count>7</stroke_count><stroke_count>8</stroke_count></misc>
        </character></kanjidic2>"#;
        let characters = decode_characters(xml.as_bytes()).unwrap();
        assert_eq!(characters[0].stroke_count, 7);
        assert_eq!(characters[0].stroke_miscounts, vec![8]);
        assert_eq!(characters[0].grade, None);
    }

    #[test]
    fn missing_stroke_count_is_rejected() {
        let xml = r#"<kanjidic2><character><literal>亜</literal><misc><grade>8</grade></misc></character></kanjidic2>"#;
        let err = decode_characters(xml.as_bytes()).unwrap_err();
        assert!(matches!(
            err,
            ImportError::RecordDecodeFailure {
                element: "character",
                ..
            }
        ));
    }

    #[test]
    fn non_numeric_grade_is_rejected() {
        let xml = r#"<kanjidic2><character><literal>亜</literal><misc><grade>one</grade><stroke_count>7</stroke_count></misc></character></kanjidic2>"#;
        assert!(decode_characters(xml.as_bytes()).is_err());
    }

    #[test]
    fn codepoint_without_type_is_rejected() {
        let xml = r#"<kanjidic2><character><literal>亜</literal><codepoint><cp_value>4e9c</cp_value></codepoint><misc><stroke_count>7</stroke_count></misc></character></kanjidic2>"#;
        let err = decode_characters(xml.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("cp_type"));
    }

    #[test]
    fn header_is_not_a_record() {
        let xml = r#"<kanjidic2><header><file_version>4</file_version></header></kanjidic2>"#;
        assert!(decode_characters(xml.as_bytes()).unwrap().is_empty());
    }
}
