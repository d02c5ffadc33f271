//! Event-driven XML parser building a [`ForestStore`].
//!
//! A thin state machine over `quick-xml` events. Each open element keeps
//! a frame with its pending text buffer, its last appended child, and a
//! rolling rollup-hash accumulator; the element's hash is finalized when
//! its end tag arrives and squared into the parent's accumulator, which
//! makes the aggregate independent of child order.
//!
//! Text handling mirrors the matcher's expectations: character runs are
//! buffered and flushed when a child element opens or the parent closes.
//! Leaf elements keep their text verbatim; in mixed content the
//! surrounding whitespace is trimmed and whitespace-only runs are
//! dropped. An element with no content at all still gets one empty text
//! child (hash zero), so "empty" and "absent" subtrees stay structurally
//! distinct. CDATA section boundaries are recorded as byte offsets into
//! the buffered text for faithful re-serialization.

use std::fs;
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::debug;

use crate::error::{ParseErrorKind, Result, XmlDiffError};
use crate::forest::{ForestStore, NodeId};
use crate::utils::content_hash;

/// Nesting limit applied when none is configured explicitly.
pub const DEFAULT_MAX_DEPTH: usize = 512;

/// Parse a document from a string with the default depth limit.
pub fn parse_str(input: &str) -> Result<ForestStore> {
    TreeParser::new().parse_str(input)
}

/// Parse a document from a file with the default depth limit.
pub fn parse_file(path: &Path) -> Result<ForestStore> {
    TreeParser::new().parse_file(path)
}

/// Reusable parser configuration.
#[derive(Debug, Clone)]
pub struct TreeParser {
    max_depth: usize,
}

impl Default for TreeParser {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeParser {
    pub fn new() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(max_depth: usize) -> Self {
        Self { max_depth }
    }

    pub fn parse_file(&self, path: &Path) -> Result<ForestStore> {
        let input = fs::read_to_string(path).map_err(|err| XmlDiffError::io(path, err))?;
        self.parse(&input, &path.display().to_string())
    }

    pub fn parse_str(&self, input: &str) -> Result<ForestStore> {
        self.parse(input, "<input>")
    }

    fn parse(&self, input: &str, context: &str) -> Result<ForestStore> {
        let mut reader = Reader::from_str(input);
        reader.config_mut().check_end_names = true;
        let mut builder = ForestBuilder::new();

        loop {
            let position = reader.buffer_position();
            match reader.read_event() {
                Err(err) => {
                    return Err(malformed(context, position, err.to_string()));
                }
                Ok(Event::Eof) => break,
                Ok(Event::Start(start)) => {
                    self.check_nesting(&builder, context)?;
                    if builder.is_complete() {
                        return Err(malformed(
                            context,
                            position,
                            "content after document root".to_string(),
                        ));
                    }
                    let tag = decode(context, start.name().as_ref())?;
                    builder.start_element(&tag);
                    for attr in start.attributes() {
                        let attr = attr
                            .map_err(|err| malformed(context, position, err.to_string()))?;
                        let name = decode(context, attr.key.as_ref())?;
                        let value = attr
                            .unescape_value()
                            .map_err(|err| malformed(context, position, err.to_string()))?;
                        builder.add_attribute(&name, &value);
                    }
                }
                Ok(Event::Empty(empty)) => {
                    self.check_nesting(&builder, context)?;
                    if builder.is_complete() {
                        return Err(malformed(
                            context,
                            position,
                            "content after document root".to_string(),
                        ));
                    }
                    let tag = decode(context, empty.name().as_ref())?;
                    builder.start_element(&tag);
                    for attr in empty.attributes() {
                        let attr = attr
                            .map_err(|err| malformed(context, position, err.to_string()))?;
                        let name = decode(context, attr.key.as_ref())?;
                        let value = attr
                            .unescape_value()
                            .map_err(|err| malformed(context, position, err.to_string()))?;
                        builder.add_attribute(&name, &value);
                    }
                    builder.end_element();
                }
                Ok(Event::Text(text)) => {
                    let text = text
                        .unescape()
                        .map_err(|err| malformed(context, position, err.to_string()))?;
                    if builder.is_open() {
                        builder.text(&text);
                    } else if !text.trim().is_empty() {
                        return Err(malformed(
                            context,
                            position,
                            "text content outside of the root element".to_string(),
                        ));
                    }
                }
                Ok(Event::CData(cdata)) => {
                    if builder.is_open() {
                        let raw = cdata.into_inner();
                        let raw = decode(context, &raw)?;
                        builder.cdata(&raw);
                    }
                }
                Ok(Event::End(_)) => {
                    if !builder.is_open() {
                        return Err(malformed(
                            context,
                            position,
                            "close tag without a matching open tag".to_string(),
                        ));
                    }
                    builder.end_element();
                }
                // Declarations, processing instructions, comments and
                // doctypes are preamble; the writer copies them verbatim
                // from the raw input.
                Ok(_) => {}
            }
        }

        if builder.is_open() {
            return Err(malformed(
                context,
                reader.buffer_position(),
                "unexpected end of document inside an element".to_string(),
            ));
        }
        let forest = builder.finish().ok_or_else(|| {
            XmlDiffError::parse(context.to_string(), ParseErrorKind::NoRootElement)
        })?;
        debug!(context, nodes = forest.node_count(), "document parsed");
        Ok(forest)
    }

    fn check_nesting(&self, builder: &ForestBuilder, context: &str) -> Result<()> {
        if builder.depth() >= self.max_depth {
            return Err(XmlDiffError::parse(
                context.to_string(),
                ParseErrorKind::DepthExceeded {
                    limit: self.max_depth,
                },
            ));
        }
        Ok(())
    }
}

fn malformed(context: &str, position: u64, message: String) -> XmlDiffError {
    XmlDiffError::parse(
        context.to_string(),
        ParseErrorKind::MalformedXml { position, message },
    )
}

fn decode(context: &str, bytes: &[u8]) -> Result<String> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|err| {
            XmlDiffError::parse(
                context.to_string(),
                ParseErrorKind::Encoding(err.to_string()),
            )
        })
}

/// One open element during the event walk.
struct Frame {
    id: NodeId,
    last_sibling: Option<NodeId>,
    /// Rollup accumulator: tag hash plus squared child contributions.
    value: u64,
    has_child_element: bool,
    buffer: String,
    /// CDATA boundaries pending for the next text node of this frame.
    cdata: Vec<usize>,
}

/// Assembles the forest from parser callbacks.
struct ForestBuilder {
    forest: ForestStore,
    stack: Vec<Frame>,
    root_done: bool,
}

impl ForestBuilder {
    fn new() -> Self {
        Self {
            forest: ForestStore::new(),
            stack: Vec::new(),
            root_done: false,
        }
    }

    fn depth(&self) -> usize {
        self.stack.len()
    }

    fn is_open(&self) -> bool {
        !self.stack.is_empty()
    }

    fn is_complete(&self) -> bool {
        self.root_done && self.stack.is_empty()
    }

    fn start_element(&mut self, tag: &str) {
        // Text buffered on the parent belongs before this child.
        self.flush_mixed_text();
        let parent = self.stack.last().map(|frame| frame.id);
        let left = self.stack.last().and_then(|frame| frame.last_sibling);
        let id = self.forest.add_element(parent, left, tag);
        if let Some(frame) = self.stack.last_mut() {
            frame.last_sibling = Some(id);
            frame.has_child_element = true;
        }
        self.stack.push(Frame {
            id,
            last_sibling: None,
            value: content_hash(tag),
            has_child_element: false,
            buffer: String::new(),
            cdata: Vec::new(),
        });
    }

    fn add_attribute(&mut self, name: &str, value: &str) {
        let frame = self.stack.last_mut().expect("attribute outside an element");
        let name_hash = content_hash(name);
        let value_hash = content_hash(value);
        let attr_hash = name_hash
            .wrapping_mul(name_hash)
            .wrapping_add(value_hash.wrapping_mul(value_hash));
        let aid = self.forest.add_attribute(
            frame.id,
            frame.last_sibling,
            name,
            value,
            value_hash,
            attr_hash,
        );
        frame.last_sibling = Some(aid);
        frame.value = frame
            .value
            .wrapping_add(attr_hash.wrapping_mul(attr_hash));
    }

    fn text(&mut self, text: &str) {
        if let Some(frame) = self.stack.last_mut() {
            frame.buffer.push_str(text);
        }
    }

    fn cdata(&mut self, raw: &str) {
        if let Some(frame) = self.stack.last_mut() {
            frame.cdata.push(frame.buffer.len());
            frame.buffer.push_str(raw);
            frame.cdata.push(frame.buffer.len());
        }
    }

    fn end_element(&mut self) {
        let frame = self.stack.pop().expect("unbalanced element stack");
        let mut value = frame.value;

        if frame.has_child_element {
            // Mixed content: trailing buffered text, trimmed.
            value = value.wrapping_add(Self::flush_text_into(
                &mut self.forest,
                frame.id,
                frame.last_sibling,
                trim(&frame.buffer),
                &frame.cdata,
            ));
        } else if !frame.buffer.is_empty() {
            // Leaf text is kept verbatim.
            value = value.wrapping_add(Self::flush_text_into(
                &mut self.forest,
                frame.id,
                frame.last_sibling,
                &frame.buffer,
                &frame.cdata,
            ));
        } else {
            // Content-free element: one empty text child, hash zero.
            let tid = self
                .forest
                .add_text(frame.id, frame.last_sibling, String::new(), 0);
            for &offset in &frame.cdata {
                self.forest.add_cdata_span(tid, offset);
            }
        }

        self.forest.set_hash(frame.id, value);
        match self.stack.last_mut() {
            Some(parent) => {
                parent.value = parent.value.wrapping_add(value.wrapping_mul(value));
            }
            None => self.root_done = true,
        }
    }

    /// Flush the parent's buffered text before a nested element opens.
    fn flush_mixed_text(&mut self) {
        let Some(frame) = self.stack.last_mut() else {
            return;
        };
        if frame.buffer.is_empty() {
            return;
        }
        let text = trim(&frame.buffer);
        if !text.is_empty() {
            let hash = content_hash(text);
            let tid = self
                .forest
                .add_text(frame.id, frame.last_sibling, text.to_string(), hash);
            for &offset in &frame.cdata {
                self.forest.add_cdata_span(tid, offset);
            }
            frame.last_sibling = Some(tid);
            frame.value = frame.value.wrapping_add(hash.wrapping_mul(hash));
        }
        frame.buffer.clear();
        frame.cdata.clear();
    }

    /// Append one text node and return its squared hash contribution.
    fn flush_text_into(
        forest: &mut ForestStore,
        parent: NodeId,
        left: Option<NodeId>,
        text: &str,
        cdata: &[usize],
    ) -> u64 {
        if text.is_empty() {
            return 0;
        }
        let hash = content_hash(text);
        let tid = forest.add_text(parent, left, text.to_string(), hash);
        for &offset in cdata {
            forest.add_cdata_span(tid, offset);
        }
        hash.wrapping_mul(hash)
    }

    fn finish(self) -> Option<ForestStore> {
        if self.root_done {
            Some(self.forest)
        } else {
            None
        }
    }
}

fn trim(text: &str) -> &str {
    text.trim_matches(|c: char| matches!(c, ' ' | '\t' | '\n' | '\r'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_basic_structure() {
        let f = parse_str(r#"<a x="1"><b>hi</b></a>"#).unwrap();
        let root = f.root();
        assert_eq!(f.tag_name(root), "a");

        let attrs = f.attributes(root);
        assert_eq!(attrs.len(), 1);
        assert_eq!(f.tag_name(attrs[0]), "x");
        assert_eq!(f.attribute_value(attrs[0]), "1");

        let b = f.first_child(root).unwrap();
        assert_eq!(f.tag_name(b), "b");
        let text = f.first_child(b).unwrap();
        assert_eq!(f.text(text), "hi");
    }

    #[test]
    fn test_whitespace_between_elements_dropped() {
        let f = parse_str("<a>\n  <b/>\n  <c/>\n</a>").unwrap();
        let children = f.children(f.root());
        assert_eq!(children.len(), 2);
        assert!(children.iter().all(|&c| f.is_element(c)));
    }

    #[test]
    fn test_leaf_text_kept_verbatim() {
        let f = parse_str("<a> x </a>").unwrap();
        let text = f.first_child(f.root()).unwrap();
        assert_eq!(f.text(text), " x ");
    }

    #[test]
    fn test_mixed_content_trimmed() {
        let f = parse_str("<a> pre <b/> post </a>").unwrap();
        let children = f.children(f.root());
        assert_eq!(children.len(), 3);
        assert_eq!(f.text(children[0]), "pre");
        assert_eq!(f.tag_name(children[1]), "b");
        assert_eq!(f.text(children[2]), "post");
    }

    #[test]
    fn test_empty_element_gets_empty_text_child() {
        let f = parse_str("<a><b/></a>").unwrap();
        let b = f.first_child(f.root()).unwrap();
        let text = f.first_child(b).unwrap();
        assert_eq!(f.text(text), "");
        assert_eq!(f.hash(text), 0);
        assert_eq!(f.descendant_count(b), 1);
    }

    #[test]
    fn test_cdata_spans_recorded() {
        let f = parse_str("<a><![CDATA[raw<>]]></a>").unwrap();
        let text = f.first_child(f.root()).unwrap();
        assert_eq!(f.text(text), "raw<>");
        assert_eq!(f.cdata_spans(text), &[0, 5]);
    }

    #[test]
    fn test_entity_unescaped() {
        let f = parse_str("<a>a &amp; b</a>").unwrap();
        let text = f.first_child(f.root()).unwrap();
        assert_eq!(f.text(text), "a & b");
    }

    #[test]
    fn test_rollup_hash_child_order_independent() {
        let f1 = parse_str("<r><a>1</a><b/></r>").unwrap();
        let f2 = parse_str("<r><b/><a>1</a></r>").unwrap();
        assert_eq!(f1.hash(f1.root()), f2.hash(f2.root()));

        let f3 = parse_str("<r><a>2</a><b/></r>").unwrap();
        assert_ne!(f1.hash(f1.root()), f3.hash(f3.root()));
    }

    #[test]
    fn test_rollup_hash_attribute_order_independent() {
        let f1 = parse_str(r#"<r a="1" b="2"/>"#).unwrap();
        let f2 = parse_str(r#"<r b="2" a="1"/>"#).unwrap();
        assert_eq!(f1.hash(f1.root()), f2.hash(f2.root()));
    }

    #[test]
    fn test_malformed_document_rejected() {
        assert!(matches!(
            parse_str("<a><b></a>"),
            Err(XmlDiffError::Parse { .. })
        ));
        assert!(matches!(
            parse_str("<a>"),
            Err(XmlDiffError::Parse { .. })
        ));
    }

    #[test]
    fn test_no_root_element() {
        let err = parse_str("<!-- only a comment -->").unwrap_err();
        assert!(err.to_string().contains("parse"));
    }

    #[test]
    fn test_depth_limit_enforced() {
        let parser = TreeParser::with_max_depth(3);
        assert!(parser.parse_str("<a><b><c/></b></a>").is_ok());
        assert!(parser.parse_str("<a><b><c><d/></c></b></a>").is_err());
    }

    proptest! {
        #[test]
        fn prop_rollup_hash_ignores_sibling_order(
            perm in Just(vec![
                "<a>1</a>",
                r#"<b x="2"/>"#,
                "<c><d/></c>",
                "<a>other</a>",
            ])
            .prop_shuffle()
        ) {
            let base = parse_str(r#"<r><a>1</a><b x="2"/><c><d/></c><a>other</a></r>"#).unwrap();
            let doc = format!("<r>{}</r>", perm.concat());
            let shuffled = parse_str(&doc).unwrap();
            prop_assert_eq!(base.hash(base.root()), shuffled.hash(shuffled.root()));
        }
    }
}
