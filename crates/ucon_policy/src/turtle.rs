//! Turtle reader.
//!
//! Syntax is handled by `oxttl`; this module folds its triples into the
//! small term model the [`crate::graph::Graph`] indexes. Collections arrive
//! as `rdf:first` / `rdf:rest` chains and blank nodes are renumbered in
//! order of first appearance.

use crate::error::{ParseError, ParseResult};
use crate::vocab;
use indexmap::IndexMap;
use oxrdf::{Subject, Term as RdfTerm};
use oxttl::TurtleParser;
use std::fmt;

/// A literal value with optional datatype or language
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Literal {
    /// Lexical form, escapes resolved
    pub lexical: String,
    /// Datatype IRI, absent for plain strings
    pub datatype: Option<String>,
    /// Language tag
    pub lang: Option<String>,
}

impl Literal {
    /// Plain string literal
    #[must_use]
    pub fn plain(lexical: impl Into<String>) -> Self {
        Self {
            lexical: lexical.into(),
            datatype: None,
            lang: None,
        }
    }

    /// Literal with an explicit datatype
    #[must_use]
    pub fn typed(lexical: impl Into<String>, datatype: &str) -> Self {
        Self {
            lexical: lexical.into(),
            datatype: Some(datatype.to_string()),
            lang: None,
        }
    }

    fn from_rdf(literal: &oxrdf::Literal) -> Self {
        let datatype = literal.datatype();
        Self {
            lexical: literal.value().to_string(),
            datatype: (literal.language().is_none() && datatype.as_str() != vocab::XSD_STRING)
                .then(|| datatype.as_str().to_string()),
            lang: literal.language().map(str::to_string),
        }
    }
}

/// RDF term
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Term {
    /// Absolute IRI
    Iri(String),
    /// Blank node, numbered per document
    Blank(u32),
    /// Literal
    Literal(Literal),
}

impl Term {
    /// IRI text if this is an IRI
    #[must_use]
    pub fn as_iri(&self) -> Option<&str> {
        match self {
            Term::Iri(iri) => Some(iri),
            _ => None,
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Iri(iri) => write!(f, "<{}>", iri),
            Term::Blank(id) => write!(f, "_:b{}", id),
            Term::Literal(lit) => write!(f, "{:?}", lit.lexical),
        }
    }
}

/// One statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Triple {
    /// Subject
    pub subject: Term,
    /// Predicate IRI
    pub predicate: String,
    /// Object
    pub object: Term,
}

/// Blank node labels to per-document numbers
#[derive(Default)]
struct BlankIds {
    ids: IndexMap<String, u32>,
}

impl BlankIds {
    fn get(&mut self, label: &str) -> Term {
        let next = self.ids.len() as u32;
        Term::Blank(*self.ids.entry(label.to_string()).or_insert(next))
    }

    fn subject(&mut self, subject: &Subject) -> ParseResult<Term> {
        match subject {
            Subject::NamedNode(node) => Ok(Term::Iri(node.as_str().to_string())),
            Subject::BlankNode(node) => Ok(self.get(node.as_str())),
            #[allow(unreachable_patterns)]
            _ => Err(ParseError::syntax(0, 0, "quoted triples are not supported")),
        }
    }

    fn object(&mut self, object: &RdfTerm) -> ParseResult<Term> {
        match object {
            RdfTerm::NamedNode(node) => Ok(Term::Iri(node.as_str().to_string())),
            RdfTerm::BlankNode(node) => Ok(self.get(node.as_str())),
            RdfTerm::Literal(literal) => Ok(Term::Literal(Literal::from_rdf(literal))),
            #[allow(unreachable_patterns)]
            _ => Err(ParseError::syntax(0, 0, "quoted triples are not supported")),
        }
    }
}

fn one_based(position: u64) -> usize {
    usize::try_from(position).map_or(usize::MAX, |p| p.saturating_add(1))
}

/// Parse a Turtle document into triples
///
/// # Errors
///
/// Returns a positioned `ParseError::Syntax` on malformed input, including
/// undeclared prefixes
pub fn parse(src: &str) -> ParseResult<Vec<Triple>> {
    let mut blanks = BlankIds::default();
    let mut triples = Vec::new();
    for parsed in TurtleParser::new().for_slice(src.as_bytes()) {
        let triple = parsed.map_err(|e| {
            let start = e.location().start;
            ParseError::syntax(one_based(start.line), one_based(start.column), e.message())
        })?;
        triples.push(Triple {
            subject: blanks.subject(&triple.subject)?,
            predicate: triple.predicate.as_str().to_string(),
            object: blanks.object(&triple.object)?,
        });
    }
    tracing::debug!(triples = triples.len(), "parsed turtle document");
    Ok(triples)
}
