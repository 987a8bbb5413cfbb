//! Graph to [`PolicyDocument`] materialization.
//!
//! The graph is walked once from the single authorization node; after
//! this point nothing downstream touches triples.

use crate::document::{
    AttributeExclusionRules, LogUsageRules, ObjectId, OutputRules, PolicyDocument, ProcessingRules,
    SemanticLogConstraints, Technique, TimeRange,
};
use crate::error::{ParseError, ParseResult};
use crate::graph::Graph;
use crate::turtle::{self, Term};
use crate::vocab;
use chrono::{DateTime, Utc};

/// Default owner when the policy names none
pub const DEFAULT_OWNER: &str = "owner";
/// Default attribute for time ranges
pub const DEFAULT_TIME_ATTRIBUTE: &str = "time:timestamp";
/// Default attribute for semantic constraints
pub const DEFAULT_SEMANTIC_ATTRIBUTE: &str = "concept:name";
/// Default exclusion scope
pub const DEFAULT_EXCLUSION_SCOPE: &str = "event";
/// Deepest chain of `attributeKey` wrappers accepted around a value
pub const MAX_VALUE_NESTING: usize = 8;

/// Parse policy document bytes into a [`PolicyDocument`]
///
/// # Errors
///
/// Returns `ParseError` on invalid syntax, a missing or duplicated
/// authorization node, missing required fields, or partially populated
/// rule blocks
pub fn parse_policy(bytes: &[u8]) -> ParseResult<PolicyDocument> {
    let src = std::str::from_utf8(bytes).map_err(|_| ParseError::InvalidUtf8)?;
    let graph = Graph::from_triples(turtle::parse(src)?);
    let doc = Decoder { graph: &graph }.document()?;
    tracing::debug!(
        file = %doc.object_id.file_name,
        algorithms = doc.processing_rules.allowed_techniques.len(),
        "decoded policy document"
    );
    Ok(doc)
}

/// Whether `name` can serve as an algorithm file and module name
#[must_use]
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Whether `name` names a file directly inside a directory: non-empty,
/// free of path separators, and neither `.` nor `..`
#[must_use]
pub fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['/', '\\']) && name != "." && name != ".."
}

struct Decoder<'g> {
    graph: &'g Graph,
}

impl<'g> Decoder<'g> {
    fn document(&self) -> ParseResult<PolicyDocument> {
        let authorizations = self.graph.instances_of(vocab::AUTHORIZATION);
        let root = match authorizations.as_slice() {
            [] => return Err(ParseError::NoAuthorization),
            [root] => *root,
            many => {
                return Err(ParseError::MultipleAuthorizations { count: many.len() });
            }
        };

        let object_id = self.object_id(root)?;
        let owner = match self.single(root, vocab::OWNER, "owner")? {
            Some(term) => self.text(term, "owner")?,
            None => DEFAULT_OWNER.to_string(),
        };
        let log_usage_rules = match self.block(root, vocab::LOG_USAGE_RULES, "logUsageRules")? {
            Some(node) => self.log_usage_rules(node)?,
            None => LogUsageRules::default(),
        };
        let output_rules = match self.block(root, vocab::OUTPUT_RULES, "outputRules")? {
            Some(node) => self.output_rules(node)?,
            None => OutputRules::default(),
        };
        let processing_rules = match self.block(root, vocab::PROCESSING_RULES, "processingRules")? {
            Some(node) => self.processing_rules(node)?,
            None => return Err(ParseError::NoAlgorithm),
        };

        Ok(PolicyDocument {
            object_id,
            log_usage_rules,
            output_rules,
            processing_rules,
            owner,
        })
    }

    fn object_id(&self, root: &Term) -> ParseResult<ObjectId> {
        let node = self
            .block(root, vocab::OBJECT_ID, "object_id")?
            .ok_or_else(|| ParseError::missing("object_id.fileName"))?;
        let file_name = match self.single(node, vocab::FILE_NAME, "object_id.fileName")? {
            Some(term) => self.text(term, "object_id.fileName")?,
            None => return Err(ParseError::missing("object_id.fileName")),
        };
        if !is_plain_file_name(&file_name) {
            return Err(ParseError::invalid(
                "object_id.fileName",
                format!("not a plain file name: {:?}", file_name),
            ));
        }
        let format = self
            .single(node, vocab::FORMAT, "object_id.format")?
            .map(|t| self.text(t, "object_id.format"))
            .transpose()?;
        Ok(ObjectId { file_name, format })
    }

    fn log_usage_rules(&self, node: &Term) -> ParseResult<LogUsageRules> {
        Ok(LogUsageRules {
            log_expiration: self.datetime(node, vocab::LOG_EXPIRATION, "logUsageRules.logExpiration")?,
            max_access_count: self.count(node, vocab::MAX_ACCESS_COUNT, "logUsageRules.maxAccessCount")?,
            allowed_locations: self.strings(node, vocab::ALLOWED_LOCATIONS, "logUsageRules.allowedLocations")?,
            access_control_rules: self.strings(
                node,
                vocab::ACCESS_CONTROL_RULES,
                "logUsageRules.accessControlRules",
            )?,
            attribute_exclusion_rules: self
                .block(
                    node,
                    vocab::ATTRIBUTE_EXCLUSION_RULES,
                    "logUsageRules.attributeExclusionRules",
                )?
                .map(|n| self.attribute_exclusion(n))
                .transpose()?,
            allowed_time_range: self
                .block(node, vocab::ALLOWED_TIME_RANGE, "logUsageRules.allowedTimeRange")?
                .map(|n| self.time_range(n, "logUsageRules.allowedTimeRange"))
                .transpose()?,
            semantic_log_constraints: self
                .block(
                    node,
                    vocab::SEMANTIC_LOG_CONSTRAINTS,
                    "logUsageRules.semanticLogConstraints",
                )?
                .map(|n| self.semantic_constraints(n))
                .transpose()?,
        })
    }

    fn output_rules(&self, node: &Term) -> ParseResult<OutputRules> {
        Ok(OutputRules {
            allowed_locations: self.strings(node, vocab::ALLOWED_LOCATIONS, "outputRules.allowedLocations")?,
            output_expiration: self.datetime(
                node,
                vocab::OUTPUT_EXPIRATION,
                "outputRules.outputExpiration",
            )?,
            access_control_rules: self.strings(
                node,
                vocab::ACCESS_CONTROL_RULES,
                "outputRules.accessControlRules",
            )?,
            allowed_time_range: self
                .block(node, vocab::ALLOWED_TIME_RANGE, "outputRules.allowedTimeRange")?
                .map(|n| self.time_range(n, "outputRules.allowedTimeRange"))
                .transpose()?,
            max_access_count: self.count(node, vocab::MAX_ACCESS_COUNT, "outputRules.maxAccessCount")?,
        })
    }

    fn processing_rules(&self, node: &Term) -> ParseResult<ProcessingRules> {
        let mut heads = self.graph.objects(node, vocab::ALLOWED_TECHNIQUES);
        heads.extend(self.graph.objects(node, vocab::ALLOWED_TECHNIQUES_ALIAS));

        let mut allowed_techniques = Vec::new();
        for head in heads {
            for item in self.items(head, "processingRules.allowedTechniques")? {
                allowed_techniques.push(self.technique(item)?);
            }
        }
        if allowed_techniques.is_empty() {
            return Err(ParseError::NoAlgorithm);
        }

        Ok(ProcessingRules {
            access_control_rules: self.strings(
                node,
                vocab::ACCESS_CONTROL_RULES,
                "processingRules.accessControlRules",
            )?,
            allowed_locations: self.strings(
                node,
                vocab::ALLOWED_LOCATIONS,
                "processingRules.allowedLocations",
            )?,
            allowed_techniques,
        })
    }

    fn technique(&self, node: &Term) -> ParseResult<Technique> {
        const BLOCK: &str = "processingRules.allowedTechniques";
        if matches!(node, Term::Literal(_)) || !self.graph.has_properties(node) {
            return Err(ParseError::incomplete(
                BLOCK,
                format!("{} is not a technique description", node),
            ));
        }
        let technique_type = match self.single(node, vocab::TECHNIQUE_TYPE, BLOCK)? {
            Some(term) => self.text(term, BLOCK)?,
            None => return Err(ParseError::incomplete(BLOCK, "technique without techniqueType")),
        };
        let algorithm = match self.single(node, vocab::ALGORITHM, BLOCK)? {
            Some(term) => self.text(term, BLOCK)?,
            None => return Err(ParseError::incomplete(BLOCK, "technique without algorithm")),
        };
        if !is_identifier(&algorithm) {
            return Err(ParseError::InvalidAlgorithmName { name: algorithm });
        }
        Ok(Technique {
            technique_type,
            algorithm,
        })
    }

    fn attribute_exclusion(&self, node: &Term) -> ParseResult<AttributeExclusionRules> {
        const BLOCK: &str = "logUsageRules.attributeExclusionRules";
        let scope = match self.single(node, vocab::SCOPE, BLOCK)? {
            Some(term) => self.text(term, BLOCK)?,
            None => DEFAULT_EXCLUSION_SCOPE.to_string(),
        };
        let event_attribute = self
            .single(node, vocab::EVENT_ATTRIBUTE, BLOCK)?
            .map(|t| self.text(t, BLOCK))
            .transpose()?;
        let excluded_attributes = self
            .strings(node, vocab::EXCLUDED_ATTRIBUTES, BLOCK)?
            .ok_or_else(|| ParseError::incomplete(BLOCK, "missing excludedAttributes"))?;
        Ok(AttributeExclusionRules {
            scope,
            event_attribute,
            excluded_attributes,
        })
    }

    fn time_range(&self, node: &Term, block: &str) -> ParseResult<TimeRange> {
        let event_attribute = match self.single(node, vocab::EVENT_ATTRIBUTE, block)? {
            Some(term) => self.text(term, block)?,
            None => DEFAULT_TIME_ATTRIBUTE.to_string(),
        };
        let start_date = self
            .datetime(node, vocab::START_DATE, block)?
            .ok_or_else(|| ParseError::incomplete(block, "missing startDate"))?;
        let end_date = self
            .datetime(node, vocab::END_DATE, block)?
            .ok_or_else(|| ParseError::incomplete(block, "missing endDate"))?;
        if start_date > end_date {
            return Err(ParseError::InvertedTimeRange {
                field: block.to_string(),
            });
        }
        Ok(TimeRange {
            event_attribute,
            start_date,
            end_date,
        })
    }

    fn semantic_constraints(&self, node: &Term) -> ParseResult<SemanticLogConstraints> {
        const BLOCK: &str = "logUsageRules.semanticLogConstraints";
        let event_attribute = match self.single(node, vocab::EVENT_ATTRIBUTE, BLOCK)? {
            Some(term) => self.text(term, BLOCK)?,
            None => DEFAULT_SEMANTIC_ATTRIBUTE.to_string(),
        };
        let must_include = self.strings(node, vocab::MUST_INCLUDE, BLOCK)?;
        let must_exclude = self.strings(node, vocab::MUST_EXCLUDE, BLOCK)?;
        if must_include.is_none() && must_exclude.is_none() {
            return Err(ParseError::incomplete(
                BLOCK,
                "needs mustInclude or mustExclude",
            ));
        }
        Ok(SemanticLogConstraints {
            event_attribute,
            must_include: must_include.unwrap_or_default(),
            must_exclude: must_exclude.unwrap_or_default(),
        })
    }

    // Value helpers

    fn single(&self, subject: &Term, predicate: &str, field: &str) -> ParseResult<Option<&'g Term>> {
        match self.graph.objects(subject, predicate).as_slice() {
            [] => Ok(None),
            [one] => Ok(Some(*one)),
            _ => Err(ParseError::invalid(field, "expected a single value")),
        }
    }

    fn block(&self, subject: &Term, predicate: &str, field: &str) -> ParseResult<Option<&'g Term>> {
        match self.single(subject, predicate, field)? {
            None => Ok(None),
            Some(Term::Literal(_)) => Err(ParseError::invalid(field, "expected a nested block")),
            Some(node) => Ok(Some(node)),
        }
    }

    fn text(&self, term: &Term, field: &str) -> ParseResult<String> {
        let mut term = term;
        for _ in 0..=MAX_VALUE_NESTING {
            match term {
                Term::Literal(lit) => return Ok(lit.lexical.trim().to_string()),
                Term::Iri(iri) => return Ok(vocab::local_name(iri).to_string()),
                // `[ ucon:attributeKey "k" ]` wraps a single value
                Term::Blank(_) => match self.single(term, vocab::ATTRIBUTE_KEY, field)? {
                    Some(inner) => term = inner,
                    None => {
                        return Err(ParseError::invalid(field, "expected a value, found a block"));
                    }
                },
            }
        }
        Err(ParseError::invalid(
            field,
            format!("value nested deeper than {} blocks", MAX_VALUE_NESTING),
        ))
    }

    /// List items when `term` heads a collection, otherwise `term` itself
    fn items(&self, term: &'g Term, field: &str) -> ParseResult<Vec<&'g Term>> {
        if self.graph.is_list(term) {
            self.graph.list_items(term, field)
        } else {
            Ok(vec![term])
        }
    }

    /// Every value of a list-valued predicate: repeated objects,
    /// collections, comma-separated literals and attribute-key blocks
    fn strings(&self, subject: &Term, predicate: &str, field: &str) -> ParseResult<Option<Vec<String>>> {
        let objects = self.graph.objects(subject, predicate);
        if objects.is_empty() {
            return Ok(None);
        }
        let mut values = Vec::new();
        for object in objects {
            for item in self.items(object, field)? {
                match item {
                    Term::Literal(lit) if lit.lexical.contains(',') => {
                        values.extend(
                            lit.lexical
                                .split(',')
                                .map(str::trim)
                                .filter(|v| !v.is_empty())
                                .map(str::to_string),
                        );
                    }
                    Term::Blank(_) if !self.graph.objects(item, vocab::ATTRIBUTE_KEY).is_empty() => {
                        for key in self.graph.objects(item, vocab::ATTRIBUTE_KEY) {
                            values.push(self.text(key, field)?);
                        }
                    }
                    _ => values.push(self.text(item, field)?),
                }
            }
        }
        Ok(Some(values))
    }

    fn datetime(&self, subject: &Term, predicate: &str, field: &str) -> ParseResult<Option<DateTime<Utc>>> {
        match self.single(subject, predicate, field)? {
            None => Ok(None),
            Some(term) => {
                let raw = self.text(term, field)?;
                ucon_core::parse_policy_datetime(&raw)
                    .map(Some)
                    .map_err(|e| ParseError::invalid(field, e.to_string()))
            }
        }
    }

    fn count(&self, subject: &Term, predicate: &str, field: &str) -> ParseResult<Option<u64>> {
        match self.single(subject, predicate, field)? {
            None => Ok(None),
            Some(term) => {
                let raw = self.text(term, field)?;
                raw.parse::<u64>()
                    .map(Some)
                    .map_err(|_| ParseError::invalid(field, format!("{:?} is not a count", raw)))
            }
        }
    }
}
