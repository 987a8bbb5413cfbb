//! XES trace logs.
//!
//! Only the structure the transforms need is modelled: log, trace and event
//! attributes keyed by name. Header elements (`extension`, `global`,
//! `classifier`) are carried through untouched.

use crate::error::XesError;
use chrono::{DateTime, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event as XmlEvent};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;

/// A raw XML element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlNode {
    /// Element name
    pub name: String,
    /// Attributes in document order
    pub attrs: Vec<(String, String)>,
    /// Child elements
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// A typed, keyed attribute (`<string key=".." value=".."/>`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// XES type element: `string`, `date`, `int`, `float`, `boolean`, ...
    pub kind: String,
    /// Attribute key, e.g. `concept:name`
    pub key: String,
    /// Value, absent for containers
    pub value: Option<String>,
    /// Nested content of list and container attributes
    pub nested: Vec<XmlNode>,
}

impl Attribute {
    /// A `string` attribute
    #[must_use]
    pub fn string(key: &str, value: &str) -> Self {
        Self::typed("string", key, value)
    }

    /// A `date` attribute
    #[must_use]
    pub fn date(key: &str, value: &str) -> Self {
        Self::typed("date", key, value)
    }

    /// An attribute of any scalar kind
    #[must_use]
    pub fn typed(kind: &str, key: &str, value: &str) -> Self {
        Self {
            kind: kind.to_string(),
            key: key.to_string(),
            value: Some(value.to_string()),
            nested: Vec::new(),
        }
    }

    fn from_node(node: XmlNode) -> Option<Self> {
        let key = node.attr("key")?.to_string();
        let value = node.attr("value").map(str::to_string);
        Some(Self {
            kind: node.name,
            key,
            value,
            nested: node.children,
        })
    }

    fn to_node(&self) -> XmlNode {
        let mut attrs = vec![("key".to_string(), self.key.clone())];
        if let Some(value) = &self.value {
            attrs.push(("value".to_string(), value.clone()));
        }
        XmlNode {
            name: self.kind.clone(),
            attrs,
            children: self.nested.clone(),
        }
    }
}

fn find<'a>(attributes: &'a [Attribute], key: &str) -> Option<&'a Attribute> {
    attributes.iter().find(|a| a.key == key)
}

/// One event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Event {
    /// Event attributes
    pub attributes: Vec<Attribute>,
}

impl Event {
    /// Attribute by key
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Attribute> {
        find(&self.attributes, key)
    }

    /// Scalar value by key
    #[must_use]
    pub fn value(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|a| a.value.as_deref())
    }

    /// Activity name (`concept:name`)
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.value("concept:name")
    }

    /// Timestamp stored under `key`, if present and RFC 3339
    #[must_use]
    pub fn timestamp(&self, key: &str) -> Option<DateTime<Utc>> {
        let value = self.value(key)?;
        DateTime::parse_from_rfc3339(value)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}

/// One trace (case)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trace {
    /// Trace attributes
    pub attributes: Vec<Attribute>,
    /// Events in order
    pub events: Vec<Event>,
}

impl Trace {
    /// Scalar trace attribute by key
    #[must_use]
    pub fn value(&self, key: &str) -> Option<&str> {
        find(&self.attributes, key).and_then(|a| a.value.as_deref())
    }

    /// Activity names in order, skipping unnamed events
    pub fn activities(&self) -> impl Iterator<Item = &str> {
        self.events.iter().filter_map(Event::name)
    }
}

/// A parsed XES log
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventLog {
    /// Attributes of the `<log>` element itself
    pub log_attrs: Vec<(String, String)>,
    /// Extensions, globals and classifiers
    pub header: Vec<XmlNode>,
    /// Log-level attributes
    pub attributes: Vec<Attribute>,
    /// Traces in order
    pub traces: Vec<Trace>,
}

fn node_from_start(start: &BytesStart<'_>) -> Result<XmlNode, XesError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attrs = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| XesError::Malformed(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| XesError::Malformed(e.to_string()))?
            .into_owned();
        attrs.push((key, value));
    }
    Ok(XmlNode {
        name,
        attrs,
        children: Vec::new(),
    })
}

fn parse_tree(bytes: &[u8]) -> Result<XmlNode, XesError> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root = None;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| XesError::Malformed(format!("at byte {}: {}", reader.buffer_position(), e)))?;
        match event {
            XmlEvent::Start(start) => stack.push(node_from_start(&start)?),
            XmlEvent::Empty(start) => {
                let node = node_from_start(&start)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => root = Some(node),
                }
            }
            XmlEvent::End(_) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| XesError::Malformed("unbalanced end tag".to_string()))?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => root = Some(node),
                }
            }
            XmlEvent::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    if !stack.is_empty() {
        return Err(XesError::Malformed("unexpected end of document".to_string()));
    }
    root.ok_or_else(|| XesError::Malformed("empty document".to_string()))
}

fn attributes_and_rest(children: Vec<XmlNode>) -> (Vec<Attribute>, Vec<XmlNode>) {
    let mut attributes = Vec::new();
    let mut rest = Vec::new();
    for child in children {
        if child.attr("key").is_some() && child.name != "trace" && child.name != "event" {
            if let Some(attribute) = Attribute::from_node(child) {
                attributes.push(attribute);
            }
        } else {
            rest.push(child);
        }
    }
    (attributes, rest)
}

impl EventLog {
    /// Parse an XES document
    ///
    /// # Errors
    ///
    /// Returns error on malformed XML or a root other than `<log>`
    pub fn parse(bytes: &[u8]) -> Result<Self, XesError> {
        let root = parse_tree(bytes)?;
        if root.name != "log" {
            return Err(XesError::UnexpectedRoot(root.name));
        }
        let (attributes, rest) = attributes_and_rest(root.children);
        let mut header = Vec::new();
        let mut traces = Vec::new();
        for child in rest {
            if child.name == "trace" {
                let (attributes, rest) = attributes_and_rest(child.children);
                let events = rest
                    .into_iter()
                    .filter(|n| n.name == "event")
                    .map(|n| Event {
                        attributes: attributes_and_rest(n.children).0,
                    })
                    .collect();
                traces.push(Trace { attributes, events });
            } else {
                header.push(child);
            }
        }
        Ok(Self {
            log_attrs: root.attrs,
            header,
            attributes,
            traces,
        })
    }

    /// Total number of events
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.traces.iter().map(|t| t.events.len()).sum()
    }

    fn write_node(writer: &mut Writer<Vec<u8>>, node: &XmlNode) -> Result<(), XesError> {
        let mut start = BytesStart::new(node.name.as_str());
        for (k, v) in &node.attrs {
            start.push_attribute((k.as_str(), v.as_str()));
        }
        if node.children.is_empty() {
            return writer
                .write_event(XmlEvent::Empty(start))
                .map_err(|e| XesError::Emit(e.to_string()));
        }
        writer
            .write_event(XmlEvent::Start(start))
            .map_err(|e| XesError::Emit(e.to_string()))?;
        for child in &node.children {
            Self::write_node(writer, child)?;
        }
        writer
            .write_event(XmlEvent::End(BytesEnd::new(node.name.as_str())))
            .map_err(|e| XesError::Emit(e.to_string()))
    }

    /// Serialize back to XES
    ///
    /// # Errors
    ///
    /// Returns error if the writer fails
    pub fn to_xml(&self) -> Result<Vec<u8>, XesError> {
        let wrap = |attributes: &[Attribute], mut children: Vec<XmlNode>| {
            let mut nodes: Vec<XmlNode> = attributes.iter().map(Attribute::to_node).collect();
            nodes.append(&mut children);
            nodes
        };
        let traces = self
            .traces
            .iter()
            .map(|trace| XmlNode {
                name: "trace".to_string(),
                attrs: Vec::new(),
                children: wrap(
                    &trace.attributes,
                    trace
                        .events
                        .iter()
                        .map(|event| XmlNode {
                            name: "event".to_string(),
                            attrs: Vec::new(),
                            children: wrap(&event.attributes, Vec::new()),
                        })
                        .collect(),
                ),
            })
            .collect();
        let mut children = self.header.clone();
        children.extend(wrap(&self.attributes, traces));
        let root = XmlNode {
            name: "log".to_string(),
            attrs: self.log_attrs.clone(),
            children,
        };

        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer
            .write_event(XmlEvent::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(|e| XesError::Emit(e.to_string()))?;
        Self::write_node(&mut writer, &root)?;
        let mut out = writer.into_inner();
        out.push(b'\n');
        Ok(out)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<log xes.version="1.0" xmlns="http://www.xes-standard.org/">
  <extension name="Concept" prefix="concept" uri="http://www.xes-standard.org/concept.xesext"/>
  <global scope="event">
    <string key="concept:name" value="__INVALID__"/>
  </global>
  <string key="concept:name" value="hospital &amp; co"/>
  <trace>
    <string key="concept:name" value="case1"/>
    <event>
      <string key="concept:name" value="A1"/>
      <string key="org:resource" value="Mario"/>
      <date key="time:timestamp" value="2021-03-01T10:00:00.000+01:00"/>
    </event>
    <event>
      <string key="concept:name" value="A5"/>
      <string key="org:resource" value="Luigi"/>
      <date key="time:timestamp" value="2021-03-02T10:00:00.000+01:00"/>
    </event>
  </trace>
  <trace>
    <string key="concept:name" value="case2"/>
    <event>
      <string key="concept:name" value="A2"/>
      <date key="time:timestamp" value="2019-06-01T08:00:00Z"/>
    </event>
    <event>
      <string key="concept:name" value="A18"/>
      <date key="time:timestamp" value="2021-06-01T08:00:00Z"/>
    </event>
  </trace>
</log>
"#;

    #[test]
    fn test_parse_structure() {
        let log = EventLog::parse(SAMPLE.as_bytes()).unwrap();
        assert_eq!(log.header.len(), 2);
        assert_eq!(log.attributes[0].value.as_deref(), Some("hospital & co"));
        assert_eq!(log.traces.len(), 2);
        assert_eq!(log.event_count(), 4);
        assert_eq!(log.traces[0].value("concept:name"), Some("case1"));
        let activities: Vec<_> = log.traces[0].activities().collect();
        assert_eq!(activities, vec!["A1", "A5"]);
        let event = &log.traces[0].events[0];
        assert_eq!(event.value("org:resource"), Some("Mario"));
        assert_eq!(
            event.timestamp("time:timestamp").unwrap().to_rfc3339(),
            "2021-03-01T09:00:00+00:00"
        );
    }

    #[test]
    fn test_emit_reparses_identically() {
        let log = EventLog::parse(SAMPLE.as_bytes()).unwrap();
        let xml = log.to_xml().unwrap();
        let text = String::from_utf8(xml.clone()).unwrap();
        assert!(text.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(text.contains("hospital &amp; co"));
        assert_eq!(EventLog::parse(&xml).unwrap(), log);
    }

    #[test]
    fn test_rejects_bad_documents() {
        assert!(matches!(
            EventLog::parse(b"<trace></trace>").unwrap_err(),
            XesError::UnexpectedRoot(ref name) if name == "trace"
        ));
        assert!(matches!(
            EventLog::parse(b"<log><trace>").unwrap_err(),
            XesError::Malformed(_)
        ));
        assert!(matches!(EventLog::parse(b"").unwrap_err(), XesError::Malformed(_)));
    }
}
