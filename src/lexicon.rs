//! JMdict `<entry>` decoding.

use crate::config::DEFAULT_GLOSS_LANG;
use crate::error::{DecodeError, ImportError};
use crate::models::{Entry, Gloss, KanjiForm, LoanSource, Reading, Sense};
use crate::parser::{Element, Record, StreamingRecordDecoder};
use std::io::BufRead;
use std::path::Path;

pub type LexiconDecoder<R> = StreamingRecordDecoder<R, Entry>;

impl Record for Entry {
    const ELEMENT: &'static str = "entry";

    fn decode<R: BufRead>(element: &mut Element<'_, R>) -> Result<Self, DecodeError> {
        let mut ent_seq = None;
        let mut kanji_forms = Vec::new();
        let mut readings = Vec::new();
        let mut senses = Vec::new();

        while let Some(child) = element.next_child()? {
            match child.name() {
                "ent_seq" => ent_seq = Some(element.number::<u32>(&child)?),
                "k_ele" => kanji_forms.push(decode_kanji_form(&mut element.enter(&child))?),
                "r_ele" => readings.push(decode_reading(&mut element.enter(&child))?),
                "sense" => senses.push(decode_sense(&mut element.enter(&child))?),
                _ => element.skip(&child)?,
            }
        }

        let ent_seq = ent_seq.ok_or_else(|| DecodeError::missing("ent_seq", "entry"))?;
        if readings.is_empty() {
            return Err(DecodeError::Invalid(format!(
                "entry {ent_seq} has no <r_ele>"
            )));
        }
        if senses.is_empty() {
            return Err(DecodeError::Invalid(format!(
                "entry {ent_seq} has no <sense>"
            )));
        }

        Ok(Entry {
            ent_seq,
            kanji_forms,
            readings,
            senses,
        })
    }
}

fn decode_kanji_form<R: BufRead>(element: &mut Element<'_, R>) -> Result<KanjiForm, DecodeError> {
    let mut text = None;
    let mut form = KanjiForm::default();
    while let Some(child) = element.next_child()? {
        match child.name() {
            "keb" => text = Some(element.text(&child)?),
            "ke_inf" => form.info.push(element.text(&child)?),
            "ke_pri" => form.priority.push(element.text(&child)?),
            _ => element.skip(&child)?,
        }
    }
    form.text = text.ok_or_else(|| DecodeError::missing("keb", "k_ele"))?;
    Ok(form)
}

fn decode_reading<R: BufRead>(element: &mut Element<'_, R>) -> Result<Reading, DecodeError> {
    let mut text = None;
    let mut reading = Reading::default();
    while let Some(child) = element.next_child()? {
        match child.name() {
            "reb" => text = Some(element.text(&child)?),
            "re_nokanji" => {
                reading.no_kanji = true;
                element.skip(&child)?;
            }
            "re_restr" => reading.restrictions.push(element.text(&child)?),
            "re_inf" => reading.info.push(element.text(&child)?),
            "re_pri" => reading.priority.push(element.text(&child)?),
            _ => element.skip(&child)?,
        }
    }
    reading.text = text.ok_or_else(|| DecodeError::missing("reb", "r_ele"))?;
    Ok(reading)
}

fn decode_sense<R: BufRead>(element: &mut Element<'_, R>) -> Result<Sense, DecodeError> {
    let mut sense = Sense::default();
    while let Some(child) = element.next_child()? {
        match child.name() {
            "stagk" => sense.kanji_restrictions.push(element.text(&child)?),
            "stagr" => sense.reading_restrictions.push(element.text(&child)?),
            "pos" => sense.parts_of_speech.push(element.text(&child)?),
            "xref" => sense.cross_references.push(element.text(&child)?),
            "ant" => sense.antonyms.push(element.text(&child)?),
            "field" => sense.fields.push(element.text(&child)?),
            "misc" => sense.misc.push(element.text(&child)?),
            "s_inf" => sense.notes.push(element.text(&child)?),
            "dial" => sense.dialects.push(element.text(&child)?),
            "lsource" => {
                let lang = child.attr("lang").unwrap_or(DEFAULT_GLOSS_LANG).to_string();
                let ls_type = child.attr("ls_type").map(str::to_string);
                let wasei = child.attr("ls_wasei") == Some("y");
                let text = element.text(&child)?;
                sense.loan_sources.push(LoanSource {
                    text,
                    lang,
                    ls_type,
                    wasei,
                });
            }
            "gloss" => {
                let lang = child.attr("lang").unwrap_or(DEFAULT_GLOSS_LANG).to_string();
                let gender = child.attr("g_gend").map(str::to_string);
                let g_type = child.attr("g_type").map(str::to_string);
                let text = element.text(&child)?;
                sense.glosses.push(Gloss {
                    text,
                    lang,
                    gender,
                    g_type,
                });
            }
            _ => element.skip(&child)?,
        }
    }
    Ok(sense)
}

/// Streams entries from a JMdict file without materialising them.
pub fn open_lexicon(path: &Path) -> Result<LexiconDecoder<Box<dyn BufRead>>, ImportError> {
    LexiconDecoder::open(path)
}

/// Decodes every entry of a JMdict file into memory.
pub fn load_lexicon(path: &Path) -> Result<Vec<Entry>, ImportError> {
    open_lexicon(path)?.collect()
}

pub fn decode_lexicon(bytes: &[u8]) -> Result<Vec<Entry>, ImportError> {
    LexiconDecoder::from_bytes(bytes).collect()
}
