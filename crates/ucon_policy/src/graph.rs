//! Subject-indexed triple graph.

use crate::error::{ParseError, ParseResult};
use crate::turtle::{Term, Triple};
use crate::vocab;
use indexmap::IndexMap;
use std::collections::HashSet;

/// Triples indexed by subject, statement order preserved
#[derive(Debug, Default)]
pub struct Graph {
    by_subject: IndexMap<Term, Vec<(String, Term)>>,
}

impl Graph {
    /// Index a list of triples
    #[must_use]
    pub fn from_triples(triples: Vec<Triple>) -> Self {
        let mut by_subject: IndexMap<Term, Vec<(String, Term)>> = IndexMap::new();
        for triple in triples {
            by_subject
                .entry(triple.subject)
                .or_default()
                .push((triple.predicate, triple.object));
        }
        Self { by_subject }
    }

    /// Number of distinct subjects
    #[must_use]
    pub fn subject_count(&self) -> usize {
        self.by_subject.len()
    }

    /// Subjects with `rdf:type` equal to `class`
    #[must_use]
    pub fn instances_of(&self, class: &str) -> Vec<&Term> {
        self.by_subject
            .iter()
            .filter(|(_, props)| {
                props
                    .iter()
                    .any(|(p, o)| p == vocab::RDF_TYPE && o.as_iri() == Some(class))
            })
            .map(|(subject, _)| subject)
            .collect()
    }

    /// All objects of `predicate` on `subject`
    #[must_use]
    pub fn objects<'a>(&'a self, subject: &Term, predicate: &str) -> Vec<&'a Term> {
        self.by_subject
            .get(subject)
            .map(|props| {
                props
                    .iter()
                    .filter(|(p, _)| p == predicate)
                    .map(|(_, o)| o)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether `subject` has any statement at all
    #[must_use]
    pub fn has_properties(&self, subject: &Term) -> bool {
        self.by_subject.contains_key(subject)
    }

    /// Whether `term` heads an RDF list
    #[must_use]
    pub fn is_list(&self, term: &Term) -> bool {
        term.as_iri() == Some(vocab::RDF_NIL) || !self.objects(term, vocab::RDF_FIRST).is_empty()
    }

    /// Resolve the list headed by `head` into its items, in order.
    ///
    /// # Errors
    ///
    /// Returns error on a cell missing `rdf:first`/`rdf:rest` or a cyclic list
    pub fn list_items<'a>(&'a self, head: &'a Term, field: &str) -> ParseResult<Vec<&'a Term>> {
        let mut items = Vec::new();
        let mut seen = HashSet::new();
        let mut cell = head;
        loop {
            if cell.as_iri() == Some(vocab::RDF_NIL) {
                return Ok(items);
            }
            if !seen.insert(cell) {
                return Err(ParseError::invalid(field, "cyclic list"));
            }
            let first = self.objects(cell, vocab::RDF_FIRST);
            let rest = self.objects(cell, vocab::RDF_REST);
            match (first.as_slice(), rest.as_slice()) {
                ([item], [next]) => {
                    items.push(*item);
                    cell = *next;
                }
                _ => return Err(ParseError::invalid(field, "malformed list cell")),
            }
        }
    }
}
