//! Forward-only record decoder over a quick-xml token stream.
//!
//! [`StreamingRecordDecoder`] walks the document one event at a time and hands
//! every `<T::ELEMENT>` subtree to [`Record::decode`] through an [`Element`]
//! cursor. Only the subtree being decoded is ever held in memory.
//!
//! The prolog is read first by [`Prolog::read`], which collects the entity
//! table and blanks the DOCTYPE out of the bytes the XML reader sees.

use crate::config::SOURCE_BUFFER_SIZE;
use crate::entities::{EntityTable, Prolog};
use crate::error::{DecodeError, ImportError};
use bzip2::read::BzDecoder;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Cursor, Read};
use std::marker::PhantomData;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

/// A record shape the decoder can build from one element subtree.
pub trait Record: Sized {
    /// Local name of the element that starts a record.
    const ELEMENT: &'static str;

    fn decode<R: BufRead>(element: &mut Element<'_, R>) -> Result<Self, DecodeError>;
}

/// Opens a source file, decompressing `.bz2` transparently.
pub fn open_source(path: &Path) -> Result<Box<dyn BufRead>, ImportError> {
    let file = File::open(path).map_err(|source| ImportError::SourceUnavailable {
        path: path.to_path_buf(),
        source,
    })?;

    let compressed = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("bz2"));

    if compressed {
        Ok(Box::new(BufReader::with_capacity(
            SOURCE_BUFFER_SIZE,
            BzDecoder::new(file),
        )))
    } else {
        Ok(Box::new(BufReader::with_capacity(SOURCE_BUFFER_SIZE, file)))
    }
}

/// Lazy, single-pass sequence of decoded records.
///
/// The first failure is yielded as an `Err` and ends the sequence; no later
/// record is attempted.
pub struct StreamingRecordDecoder<R, T> {
    reader: Reader<R>,
    buf: Vec<u8>,
    entities: EntityTable,
    decoded: usize,
    done: bool,
    _record: PhantomData<fn() -> T>,
}

enum Step {
    Record { empty: bool },
    Skip,
    Eof,
    Fail(quick_xml::Error),
}

impl<R: BufRead, T: Record> StreamingRecordDecoder<R, T> {
    pub fn new(source: R, entities: EntityTable) -> Self {
        let mut reader = Reader::from_reader(source);
        reader.trim_text(true);
        Self {
            reader,
            buf: Vec::new(),
            entities,
            decoded: 0,
            done: false,
            _record: PhantomData,
        }
    }

    /// Number of records yielded so far.
    pub fn decoded(&self) -> usize {
        self.decoded
    }

    fn fail(&mut self, err: DecodeError) -> ImportError {
        self.done = true;
        match err {
            DecodeError::Malformed { position, reason } => {
                ImportError::MalformedDocument { position, reason }
            }
            DecodeError::Invalid(reason) => ImportError::RecordDecodeFailure {
                element: T::ELEMENT,
                index: self.decoded + 1,
                reason,
            },
        }
    }
}

impl<T: Record> StreamingRecordDecoder<Box<dyn BufRead>, T> {
    /// Reads the prolog for the entity table, then streams the rest of the file.
    pub fn open(path: &Path) -> Result<Self, ImportError> {
        let mut source = open_source(path)?;
        let prolog = Prolog::read(&mut source).map_err(|source| ImportError::SourceUnavailable {
            path: path.to_path_buf(),
            source,
        })?;
        let entities = prolog.entities();
        debug!(
            path = %path.display(),
            entities = entities.len(),
            element = T::ELEMENT,
            "Opening record stream"
        );
        let body: Box<dyn BufRead> = Box::new(Cursor::new(prolog.head).chain(source));
        Ok(Self::new(body, entities))
    }
}

impl<'a, T: Record> StreamingRecordDecoder<io::Chain<Cursor<Vec<u8>>, &'a [u8]>, T> {
    pub fn from_bytes(bytes: &'a [u8]) -> Self {
        let (prolog, rest) = Prolog::split(bytes);
        let entities = prolog.entities();
        Self::new(Cursor::new(prolog.head).chain(rest), entities)
    }
}

impl<R: BufRead, T: Record> Iterator for StreamingRecordDecoder<R, T> {
    type Item = Result<T, ImportError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            self.buf.clear();
            let step = match self.reader.read_event_into(&mut self.buf) {
                Ok(Event::Start(e)) if e.local_name().as_ref() == T::ELEMENT.as_bytes() => {
                    Step::Record { empty: false }
                }
                Ok(Event::Empty(e)) if e.local_name().as_ref() == T::ELEMENT.as_bytes() => {
                    Step::Record { empty: true }
                }
                Ok(Event::Eof) => Step::Eof,
                Ok(_) => Step::Skip,
                Err(e) => Step::Fail(e),
            };

            match step {
                Step::Skip => continue,
                Step::Eof => {
                    self.done = true;
                    return None;
                }
                Step::Fail(e) => {
                    let err = malformed(self.reader.buffer_position(), e);
                    return Some(Err(self.fail(err)));
                }
                Step::Record { empty } => {
                    let mut element = Element {
                        reader: &mut self.reader,
                        buf: &mut self.buf,
                        entities: &self.entities,
                        name: T::ELEMENT,
                        open_child: false,
                        finished: empty,
                    };
                    return match T::decode(&mut element) {
                        Ok(record) => {
                            self.decoded += 1;
                            Some(Ok(record))
                        }
                        Err(err) => Some(Err(self.fail(err))),
                    };
                }
            }
        }
    }
}

fn malformed(position: usize, err: impl std::fmt::Display) -> DecodeError {
    DecodeError::Malformed {
        position,
        reason: err.to_string(),
    }
}

/// A child element start tag with its attributes already entity-resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Child {
    name: String,
    attributes: Vec<(String, String)>,
    empty: bool,
}

impl Child {
    fn from_start(
        start: &BytesStart<'_>,
        entities: &EntityTable,
        empty: bool,
        position: usize,
    ) -> Result<Self, DecodeError> {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| malformed(position, e))?;
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr
                .unescape_value_with(|entity| entities.resolve(entity))
                .map_err(|e| malformed(position, e))?
                .into_owned();
            attributes.push((key, value));
        }
        Ok(Self {
            name,
            attributes,
            empty,
        })
    }

    /// Local name, without any namespace prefix.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attribute value by local name (`xml:lang` is looked up as `lang`).
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Cursor over the children of one open element.
///
/// A child returned by [`Element::next_child`] and not consumed with
/// [`Element::text`], [`Element::enter`] or [`Element::skip`] is skipped on
/// the next call.
pub struct Element<'r, R> {
    reader: &'r mut Reader<R>,
    buf: &'r mut Vec<u8>,
    entities: &'r EntityTable,
    name: &'r str,
    open_child: bool,
    finished: bool,
}

impl<'r, R: BufRead> Element<'r, R> {
    fn position(&self) -> usize {
        self.reader.buffer_position()
    }

    pub fn next_child(&mut self) -> Result<Option<Child>, DecodeError> {
        if self.open_child {
            self.skip_open_child()?;
        }
        if self.finished {
            return Ok(None);
        }

        let entities = self.entities;
        loop {
            self.buf.clear();
            let position = self.position();
            match self.reader.read_event_into(&mut *self.buf) {
                Ok(Event::Start(e)) => {
                    let child = Child::from_start(&e, entities, false, position)?;
                    self.open_child = true;
                    return Ok(Some(child));
                }
                Ok(Event::Empty(e)) => {
                    return Child::from_start(&e, entities, true, position).map(Some);
                }
                Ok(Event::End(_)) => {
                    self.finished = true;
                    return Ok(None);
                }
                Ok(Event::Eof) => {
                    return Err(DecodeError::Malformed {
                        position,
                        reason: format!("document ends inside <{}>", self.name),
                    });
                }
                Ok(_) => {}
                Err(e) => return Err(malformed(position, e)),
            }
        }
    }

    /// Character data of `child` with entities substituted. Markup nested
    /// inside the child is skipped.
    pub fn text(&mut self, child: &Child) -> Result<String, DecodeError> {
        if child.empty {
            return Ok(String::new());
        }
        self.open_child = false;

        let entities = self.entities;
        let mut text = String::new();
        let mut depth = 0usize;
        loop {
            self.buf.clear();
            let position = self.position();
            match self.reader.read_event_into(&mut *self.buf) {
                Ok(Event::Text(t)) if depth == 0 => {
                    let value = t
                        .unescape_with(|entity| entities.resolve(entity))
                        .map_err(|e| malformed(position, e))?;
                    text.push_str(&value);
                }
                Ok(Event::CData(c)) if depth == 0 => {
                    text.push_str(&String::from_utf8_lossy(&c));
                }
                Ok(Event::Start(_)) => depth += 1,
                Ok(Event::End(_)) => {
                    if depth == 0 {
                        return Ok(text);
                    }
                    depth -= 1;
                }
                Ok(Event::Eof) => {
                    return Err(DecodeError::Malformed {
                        position,
                        reason: format!("document ends inside <{}>", child.name),
                    });
                }
                Ok(_) => {}
                Err(e) => return Err(malformed(position, e)),
            }
        }
    }

    /// Cursor over the children of `child`.
    pub fn enter<'c>(&'c mut self, child: &'c Child) -> Element<'c, R> {
        self.open_child = false;
        Element {
            reader: &mut *self.reader,
            buf: &mut *self.buf,
            entities: self.entities,
            name: &child.name,
            open_child: false,
            finished: child.empty,
        }
    }

    /// Discards `child` and everything below it.
    pub fn skip(&mut self, child: &Child) -> Result<(), DecodeError> {
        if child.empty || !self.open_child {
            return Ok(());
        }
        self.skip_open_child()
    }

    fn skip_open_child(&mut self) -> Result<(), DecodeError> {
        self.open_child = false;
        let mut depth = 0usize;
        loop {
            self.buf.clear();
            let position = self.position();
            match self.reader.read_event_into(&mut *self.buf) {
                Ok(Event::Start(_)) => depth += 1,
                Ok(Event::End(_)) => {
                    if depth == 0 {
                        return Ok(());
                    }
                    depth -= 1;
                }
                Ok(Event::Eof) => {
                    return Err(DecodeError::Malformed {
                        position,
                        reason: format!("document ends inside <{}>", self.name),
                    });
                }
                Ok(_) => {}
                Err(e) => return Err(malformed(position, e)),
            }
        }
    }

    /// Text of `child` parsed as a number.
    pub fn number<N: FromStr>(&mut self, child: &Child) -> Result<N, DecodeError> {
        let text = self.text(child)?;
        parse_field(&text, &child.name)
    }
}

pub fn parse_field<N: FromStr>(text: &str, field: &str) -> Result<N, DecodeError> {
    text.trim()
        .parse()
        .map_err(|_| DecodeError::Invalid(format!("<{field}> is not a number: {text:?}")))
}
