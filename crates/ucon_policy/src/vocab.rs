//! Namespaces and predicate IRIs of the policy vocabulary.

macro_rules! ucon {
    ($local:literal) => {
        concat!("http://example.org/ucon#", $local)
    };
}

macro_rules! event_log {
    ($local:literal) => {
        concat!("http://example.org/eventLog#", $local)
    };
}

macro_rules! pmt {
    ($local:literal) => {
        concat!("http://example.org/pmt#", $local)
    };
}

/// Authorization and rule predicates
pub const UCON_NS: &str = ucon!("");
/// Event-log object metadata
pub const EVENT_LOG_NS: &str = event_log!("");
/// Process-mining technique typing
pub const PMT_NS: &str = pmt!("");
/// Location codes
pub const LOC_NS: &str = "http://id.loc.gov/vocabulary/countries/";

/// `rdf:type`
pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
/// `rdf:first`
pub const RDF_FIRST: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#first";
/// `rdf:rest`
pub const RDF_REST: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#rest";
/// `rdf:nil`
pub const RDF_NIL: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#nil";

/// `xsd:integer`
pub const XSD_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";
/// `xsd:string`, the implicit datatype of plain literals
pub const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";

/// Class of the top-level node
pub const AUTHORIZATION: &str = ucon!("Authorization");

pub(crate) const OBJECT_ID: &str = ucon!("object_id");
pub(crate) const OWNER: &str = ucon!("owner");
pub(crate) const FILE_NAME: &str = event_log!("fileName");
pub(crate) const FORMAT: &str = event_log!("format");

pub(crate) const LOG_USAGE_RULES: &str = ucon!("logUsageRules");
pub(crate) const OUTPUT_RULES: &str = ucon!("outputRules");
pub(crate) const PROCESSING_RULES: &str = ucon!("processingRules");

pub(crate) const LOG_EXPIRATION: &str = ucon!("logExpiration");
pub(crate) const OUTPUT_EXPIRATION: &str = ucon!("outputExpiration");
pub(crate) const MAX_ACCESS_COUNT: &str = ucon!("maxAccessCount");
pub(crate) const ALLOWED_LOCATIONS: &str = ucon!("allowedLocations");
pub(crate) const ACCESS_CONTROL_RULES: &str = ucon!("accessControlRules");

pub(crate) const ATTRIBUTE_EXCLUSION_RULES: &str = ucon!("attributeExclusionRules");
pub(crate) const SCOPE: &str = ucon!("scope");
pub(crate) const EVENT_ATTRIBUTE: &str = ucon!("eventAttribute");
pub(crate) const EXCLUDED_ATTRIBUTES: &str = ucon!("excludedAttributes");
pub(crate) const ATTRIBUTE_KEY: &str = ucon!("attributeKey");

pub(crate) const ALLOWED_TIME_RANGE: &str = ucon!("allowedTimeRange");
pub(crate) const START_DATE: &str = ucon!("startDate");
pub(crate) const END_DATE: &str = ucon!("endDate");

pub(crate) const SEMANTIC_LOG_CONSTRAINTS: &str = ucon!("semanticLogConstraints");
pub(crate) const MUST_INCLUDE: &str = ucon!("mustInclude");
pub(crate) const MUST_EXCLUDE: &str = ucon!("mustExclude");

pub(crate) const ALLOWED_TECHNIQUES: &str = ucon!("allowedTechniques");
/// Historical misspelling still found in deployed policies
pub(crate) const ALLOWED_TECHNIQUES_ALIAS: &str = ucon!("allowedTechinique");
pub(crate) const TECHNIQUE_TYPE: &str = pmt!("techniqueType");
pub(crate) const ALGORITHM: &str = pmt!("algorithm");

/// Reduce an IRI to its local name (text after the last `#` or `/`)
#[must_use]
pub fn local_name(iri: &str) -> &str {
    iri.rfind(['#', '/'])
        .map_or(iri, |idx| &iri[idx + 1..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_name() {
        assert_eq!(local_name("http://example.org/pmt#HeuristicMiner"), "HeuristicMiner");
        assert_eq!(local_name("http://id.loc.gov/vocabulary/countries/it"), "it");
        assert_eq!(local_name("plain"), "plain");
    }

    #[test]
    fn test_namespaced_constants() {
        assert_eq!(AUTHORIZATION, "http://example.org/ucon#Authorization");
        assert!(FILE_NAME.starts_with(EVENT_LOG_NS));
        assert!(ALGORITHM.starts_with(PMT_NS));
        assert!(LOG_USAGE_RULES.starts_with(UCON_NS));
    }
}
