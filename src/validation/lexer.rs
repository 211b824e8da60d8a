//! Normalized token view of an access-query
//!
//! Built on the PostgreSQL tokenizer so string literals and comments are
//! told apart from executable words. Comment bodies and quoted identifiers
//! stay visible to the keyword scan. When the tokenizer stops on an error
//! the view keeps the tokens read so far plus the raw remainder, so the
//! structural rules still see the statement.

use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::keywords::Keyword;
use sqlparser::tokenizer::{Location, Token, TokenWithLocation, Tokenizer, Whitespace};

/// First significant token of a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootToken {
    /// A recognized SQL keyword, with its spelling as written.
    Keyword(Keyword, String),
    /// Anything else: identifiers, literals, operators.
    Other(String),
}

pub struct QueryView {
    tokens: Vec<Token>,
    /// Text the tokenizer could not consume.
    remainder: Option<String>,
    error: Option<String>,
}

impl QueryView {
    pub fn tokenize(query: &str) -> Self {
        let dialect = PostgreSqlDialect {};
        let mut buf: Vec<TokenWithLocation> = Vec::new();
        let result = Tokenizer::new(&dialect, query).tokenize_with_location_into_buf(&mut buf);

        let (remainder, error) = match result {
            Ok(()) => (None, None),
            Err(e) => {
                // Restart from the last complete token; rescanning it is harmless
                let from = buf
                    .last()
                    .map(|t| char_offset(query, &t.location))
                    .unwrap_or(0);
                (Some(query.chars().skip(from).collect()), Some(e.to_string()))
            }
        };

        Self {
            tokens: buf.into_iter().map(|t| t.token).collect(),
            remainder,
            error,
        }
    }

    /// Tokenizer failure, if the text could not be read to the end.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// True when the text holds nothing but whitespace, comments and
    /// terminators.
    pub fn is_blank(&self) -> bool {
        !self
            .tokens
            .iter()
            .any(|t| is_significant(t) && *t != Token::SemiColon)
    }

    /// Number of `;`-separated segments with at least one significant token.
    pub fn statement_count(&self) -> usize {
        self.tokens
            .split(|t| *t == Token::SemiColon)
            .filter(|segment| segment.iter().any(is_significant))
            .count()
    }

    /// Root operation, skipping comments and opening parentheses.
    pub fn root(&self) -> Option<RootToken> {
        self.tokens
            .iter()
            .find(|t| is_significant(t) && **t != Token::LParen)
            .map(|t| match t {
                Token::Word(word) if word.quote_style.is_none() && word.keyword != Keyword::NoKeyword => {
                    RootToken::Keyword(word.keyword, word.value.clone())
                }
                other => RootToken::Other(other.to_string()),
            })
    }

    /// Every word that can name something at execution time, lowercased:
    /// bare and quoted identifiers, words inside comments and words in an
    /// untokenized remainder. String literals are data and are skipped.
    pub fn words(&self) -> Vec<String> {
        let mut words = Vec::new();
        for token in &self.tokens {
            match token {
                Token::Word(word) if word.quote_style.is_none() => {
                    words.push(word.value.to_lowercase());
                }
                Token::Word(word) => words.extend(loose_words(&word.value)),
                Token::Whitespace(Whitespace::SingleLineComment { comment, .. })
                | Token::Whitespace(Whitespace::MultiLineComment(comment)) => {
                    words.extend(loose_words(comment));
                }
                _ => {}
            }
        }
        if let Some(remainder) = &self.remainder {
            words.extend(loose_words(remainder));
        }
        words
    }

    /// True when the text uses a `U&"..."` identifier, whose escapes can
    /// spell any name past the word scan.
    pub fn has_unicode_identifier(&self) -> bool {
        self.tokens.windows(3).any(|w| match w {
            [Token::Word(prefix), Token::Ampersand, Token::Word(ident)] => {
                prefix.quote_style.is_none()
                    && prefix.value.eq_ignore_ascii_case("u")
                    && ident.quote_style.is_some()
            }
            _ => false,
        })
    }
}

fn is_significant(token: &Token) -> bool {
    !matches!(token, Token::Whitespace(_) | Token::EOF)
}

fn loose_words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
}

/// Char offset of a 1-based line/column position.
fn char_offset(query: &str, location: &Location) -> usize {
    let (mut line, mut column) = (1u64, 1u64);
    for (offset, c) in query.chars().enumerate() {
        if line == location.line && column == location.column {
            return offset;
        }
        if c == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }
    query.chars().count()
}
