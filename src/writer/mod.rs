//! Edit script rendering.
//!
//! Renders two annotated forests into a line-oriented script: the
//! document preamble is copied verbatim from the raw left input up to
//! the line carrying the root tag, then the tree is reproduced with
//! inline processing-instruction markers. Removed elements get
//! `<?DELETE tag?>`, added ones `<?INSERT tag?>`, changed attributes
//! `<?UPDATE name FROM "old"?>` (with the new value printed in place),
//! and changed text runs `<?UPDATE FROM "old"?>`. CDATA sections are
//! re-wrapped from the byte spans recorded at parse time.
//!
//! The writer is driven purely by the match annotations; it never
//! re-examines content. `Unset` renders as unchanged.

use std::io::Write;

use tracing::debug;

use crate::error::Result;
use crate::forest::{ForestStore, MatchState, NodeId};

/// Renders a pair of annotated forests into an edit script.
pub struct DiffWriter<'a, W: Write> {
    left: &'a ForestStore,
    right: &'a ForestStore,
    out: W,
    /// A just-closed inline text run still needs its line ended before
    /// the next tag.
    need_newline: bool,
}

impl<'a, W: Write> DiffWriter<'a, W> {
    pub fn new(left: &'a ForestStore, right: &'a ForestStore, out: W) -> Self {
        Self {
            left,
            right,
            out,
            need_newline: false,
        }
    }

    /// Write the full script. `raw_left` is the original text of the
    /// left document, used only for the preamble copy.
    pub fn write_script(mut self, raw_left: &str) -> Result<()> {
        let root1 = self.left.root();
        let root2 = self.right.root();

        // `<root ...>` must match but `< root>` is not valid XML, so the
        // open bracket plus tag is the comparison key.
        let root_open = format!("<{}", self.left.tag_name(root1));
        for line in raw_left.lines() {
            if line.contains(&root_open) {
                break;
            }
            writeln!(self.out, "{line}")?;
        }

        match self.left.matching(root1) {
            MatchState::NoMatch => {
                self.write_delete_node(root1)?;
                self.write_insert_node(root2)?;
            }
            _ => self.write_diff_node(root1, root2)?,
        }
        self.out.flush()?;
        debug!("edit script written");
        Ok(())
    }

    /// A subtree present only on the left.
    fn write_delete_node(&mut self, node: NodeId) -> Result<()> {
        if !self.left.is_element(node) {
            writeln!(
                self.out,
                "<?DELETE \"{}\"?>",
                construct_text(self.left, node)
            )?;
            self.need_newline = false;
            return Ok(());
        }

        let tag = self.left.tag_name(node);
        write!(self.out, "<{tag}")?;
        for attr in self.left.attributes(node) {
            write!(
                self.out,
                " {}=\"{}\"",
                self.left.tag_name(attr),
                self.left.attribute_value(attr)
            )?;
        }

        let children = self.left.children(node);
        if children.is_empty() {
            writeln!(self.out, "/><?DELETE {tag}?>")?;
            self.need_newline = false;
            return Ok(());
        }
        writeln!(self.out, "><?DELETE {tag}?>")?;
        self.need_newline = false;
        for child in children {
            self.write_match_node(Side::Left, child)?;
        }
        self.finish_line()?;
        writeln!(self.out, "</{}>", self.left.tag_name(node))?;
        Ok(())
    }

    /// A subtree present only on the right.
    fn write_insert_node(&mut self, node: NodeId) -> Result<()> {
        if !self.right.is_element(node) {
            writeln!(
                self.out,
                "{}<?INSERT?>",
                construct_text(self.right, node)
            )?;
            self.need_newline = false;
            return Ok(());
        }

        let tag = self.right.tag_name(node);
        write!(self.out, "<{tag}")?;
        for attr in self.right.attributes(node) {
            write!(
                self.out,
                " {}=\"{}\"",
                self.right.tag_name(attr),
                self.right.attribute_value(attr)
            )?;
        }

        let children = self.right.children(node);
        if children.is_empty() {
            writeln!(self.out, "/><?INSERT {tag}?>")?;
            self.need_newline = false;
            return Ok(());
        }
        writeln!(self.out, "><?INSERT {tag}?>")?;
        self.need_newline = false;
        for child in children {
            self.write_match_node(Side::Right, child)?;
        }
        self.finish_line()?;
        writeln!(self.out, "</{}>", self.right.tag_name(node))?;
        Ok(())
    }

    /// An unchanged subtree, reproduced verbatim from one side.
    fn write_match_node(&mut self, side: Side, node: NodeId) -> Result<()> {
        let forest = self.forest(side);
        if !forest.is_element(node) {
            write!(self.out, "{}", construct_text(forest, node))?;
            self.need_newline = false;
            return Ok(());
        }

        if self.need_newline {
            writeln!(self.out)?;
        }
        let tag = forest.tag_name(node).to_string();
        write!(self.out, "<{tag}")?;
        for attr in forest.attributes(node) {
            write!(
                self.out,
                " {}=\"{}\"",
                forest.tag_name(attr),
                forest.attribute_value(attr)
            )?;
        }

        let children = forest.children(node);
        if children.is_empty() {
            writeln!(self.out, "/>")?;
            self.need_newline = false;
            return Ok(());
        }
        write!(self.out, ">")?;
        self.need_newline = true;
        for child in children {
            self.write_match_node(side, child)?;
        }
        self.finish_line()?;
        writeln!(self.out, "</{tag}>")?;
        Ok(())
    }

    /// A matched pair with differences somewhere below.
    fn write_diff_node(&mut self, node1: NodeId, node2: NodeId) -> Result<()> {
        if !self.left.is_element(node1) {
            write!(
                self.out,
                "{}<?UPDATE FROM \"{}\"?>",
                construct_text(self.right, node2),
                construct_text(self.left, node1)
            )?;
            self.need_newline = false;
            return Ok(());
        }

        if self.need_newline {
            writeln!(self.out)?;
        }
        let tag = self.left.tag_name(node1).to_string();
        write!(self.out, "<{tag}")?;

        // Markers accumulate after the open tag.
        let mut markers = String::new();
        for attr in self.left.attributes(node1) {
            let name = self.left.tag_name(attr);
            let value = self.left.attribute_value(attr);
            match self.left.matching(attr) {
                MatchState::Unset => {
                    write!(self.out, " {name}=\"{value}\"")?;
                }
                MatchState::NoMatch => {
                    write!(self.out, " {name}=\"{value}\"")?;
                    markers.push_str(&format!("<?DELETE {name}?>"));
                }
                MatchState::Changed(counterpart) => {
                    let new_value = self.right.attribute_value(counterpart);
                    write!(self.out, " {name}=\"{new_value}\"")?;
                    markers.push_str(&format!("<?UPDATE {name} FROM \"{value}\"?>"));
                }
            }
        }
        for attr in self.right.attributes(node2) {
            if self.right.matching(attr) == MatchState::NoMatch {
                let name = self.right.tag_name(attr);
                let value = self.right.attribute_value(attr);
                write!(self.out, " {name}=\"{value}\"")?;
                markers.push_str(&format!("<?INSERT {name}?>"));
            }
        }

        let children1 = self.left.children(node1);
        if children1.is_empty() {
            writeln!(self.out, "/>{markers}")?;
            self.need_newline = false;
            return Ok(());
        }
        write!(self.out, ">{markers}")?;
        self.need_newline = true;

        for child in children1 {
            match self.left.matching(child) {
                MatchState::Unset => self.write_match_node(Side::Left, child)?,
                MatchState::NoMatch => self.write_delete_node(child)?,
                MatchState::Changed(counterpart) => self.write_diff_node(child, counterpart)?,
            }
        }
        for child in self.right.children(node2) {
            if self.right.matching(child) == MatchState::NoMatch {
                self.write_insert_node(child)?;
            }
        }

        self.finish_line()?;
        writeln!(self.out, "</{tag}>")?;
        Ok(())
    }

    fn forest(&self, side: Side) -> &'a ForestStore {
        match side {
            Side::Left => self.left,
            Side::Right => self.right,
        }
    }

    fn finish_line(&mut self) -> Result<()> {
        if self.need_newline {
            writeln!(self.out)?;
            self.need_newline = false;
        }
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum Side {
    Left,
    Right,
}

/// Re-assemble a text run, wrapping recorded CDATA spans.
fn construct_text(forest: &ForestStore, node: NodeId) -> String {
    let text = forest.text(node);
    let spans = forest.cdata_spans(node);
    if spans.is_empty() {
        return text.to_string();
    }

    let mut buf = String::new();
    let mut last_end = 0;
    for pair in spans.chunks(2) {
        let start = pair[0].min(text.len());
        let end = pair.get(1).copied().unwrap_or(text.len()).min(text.len());
        if start > last_end {
            buf.push_str(&text[last_end..start]);
        }
        buf.push_str("<![CDATA[");
        buf.push_str(&text[start..end]);
        buf.push_str("]]>");
        last_end = end;
    }
    if last_end < text.len() {
        buf.push_str(&text[last_end..]);
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::DiffEngine;
    use crate::parser::parse_str;

    fn script(doc1: &str, doc2: &str) -> String {
        let mut left = parse_str(doc1).unwrap();
        let mut right = parse_str(doc2).unwrap();
        let changed = DiffEngine::new().diff(&mut left, &mut right).unwrap();
        assert!(changed, "documents are identical");
        let mut buf = Vec::new();
        DiffWriter::new(&left, &right, &mut buf)
            .write_script(doc1)
            .unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_leaf_update_marker() {
        let out = script("<a><b>1</b></a>", "<a><b>2</b></a>");
        assert!(out.contains("2<?UPDATE FROM \"1\"?>"), "got: {out}");
        assert!(!out.contains("DELETE"), "got: {out}");
        assert!(!out.contains("INSERT"), "got: {out}");
    }

    #[test]
    fn test_attribute_update_marker() {
        let out = script(r#"<a><b x="1"/></a>"#, r#"<a><b x="2"/></a>"#);
        // The new value is printed inline, the old one in the marker.
        assert!(out.contains("x=\"2\""), "got: {out}");
        assert!(out.contains("<?UPDATE x FROM \"1\"?>"), "got: {out}");
    }

    #[test]
    fn test_attribute_insert_and_delete_markers() {
        let out = script(r#"<a><b x="1"/></a>"#, r#"<a><b y="2"/></a>"#);
        assert!(out.contains("<?DELETE x?>"), "got: {out}");
        assert!(out.contains("<?INSERT y?>"), "got: {out}");
    }

    #[test]
    fn test_element_delete_marker() {
        let out = script("<a><b/><c/></a>", "<a><c/></a>");
        assert!(out.contains("<?DELETE b?>"), "got: {out}");
    }

    #[test]
    fn test_element_insert_marker() {
        let out = script(
            r#"<a><x id="1"/></a>"#,
            r#"<a><x id="1"/><x id="2"/></a>"#,
        );
        assert!(out.contains("<?INSERT x?>"), "got: {out}");
        assert!(out.contains("id=\"2\""), "got: {out}");
    }

    #[test]
    fn test_preamble_copied_verbatim() {
        let doc1 = "<?xml version=\"1.0\"?>\n<!-- v1 -->\n<a><b>1</b></a>";
        let out = script(doc1, "<a><b>2</b></a>");
        assert!(out.starts_with("<?xml version=\"1.0\"?>\n<!-- v1 -->\n"));
    }

    #[test]
    fn test_cdata_rewrapped() {
        let out = script(
            "<a><b><![CDATA[x<y]]></b><c/></a>",
            "<a><c/></a>",
        );
        assert!(out.contains("<![CDATA[x<y]]>"), "got: {out}");
    }

    #[test]
    fn test_whole_tree_replace_on_root_rename() {
        let out = script("<a><b/></a>", "<c><b/></c>");
        assert!(out.contains("<?DELETE a?>"), "got: {out}");
        assert!(out.contains("<?INSERT c?>"), "got: {out}");
    }
}
