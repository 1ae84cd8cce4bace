//! MusicXML tokenizer.
//!
//! Flattens the `xml-rs` event stream into the four token kinds the score
//! builder understands. Whitespace, comments and processing instructions
//! never reach the builder.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use xml::reader::{EventReader, XmlEvent};

use crate::error::ScoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    StartElement(String),
    EndElement(String),
    Text(String),
    EndOfDocument,
}

/// Iterator of tokens over any XML byte source.
pub struct XmlTokens<R: Read> {
    reader: EventReader<R>,
    done: bool,
}

impl<R: Read> XmlTokens<R> {
    pub fn new(source: R) -> Self {
        Self {
            reader: EventReader::new(source),
            done: false,
        }
    }
}

/// Open a MusicXML file as a token stream
pub fn open(path: &Path) -> Result<XmlTokens<BufReader<File>>, ScoreError> {
    let file = File::open(path).map_err(|source| ScoreError::SourceUnavailable {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(XmlTokens::new(BufReader::new(file)))
}

impl<R: Read> Iterator for XmlTokens<R> {
    type Item = Result<Token, ScoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            let event = match self.reader.next() {
                Ok(event) => event,
                Err(e) => {
                    self.done = true;
                    return Some(Err(ScoreError::MalformedMarkup(e.to_string())));
                }
            };
            let token = match event {
                XmlEvent::StartElement { name, .. } => Token::StartElement(name.local_name),
                XmlEvent::EndElement { name } => Token::EndElement(name.local_name),
                XmlEvent::Characters(text) | XmlEvent::CData(text) => Token::Text(text),
                XmlEvent::EndDocument => {
                    self.done = true;
                    Token::EndOfDocument
                }
                _ => continue,
            };
            return Some(Ok(token));
        }
    }
}
