//! Mutable HTML document built on html5ever's reference-counted DOM.
//!
//! [`HtmlDocument`] is parsed once from renderer output, mutated in place by
//! the post-processing steps and serialised once. The free functions in this
//! module are the small set of tree operations those steps need; they work on
//! [`Handle`]s so a step can collect nodes first and mutate afterwards,
//! without holding a borrow of the tree across the mutation.

use crate::error::Md2HtmlError;
use html5ever::serialize::{serialize, SerializeOpts};
use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::{parse_document, Attribute, LocalName, Namespace, ParseOpts, QualName};
use markup5ever_rcdom::{Handle, Node, NodeData, RcDom, SerializableHandle};
use std::cell::RefCell;
use std::rc::Rc;

const HTML_NS: &str = "http://www.w3.org/1999/xhtml";

/// A parsed, mutable HTML document.
pub struct HtmlDocument {
    dom: RcDom,
}

impl HtmlDocument {
    /// Parse a complete document. html5ever never fails: malformed input is
    /// repaired the way a browser would repair it.
    pub fn parse(html: &str) -> Self {
        let dom = parse_document(RcDom::default(), ParseOpts::default()).one(html);
        Self { dom }
    }

    /// Serialise the whole document, doctype included.
    pub fn to_html(&self) -> Result<String, Md2HtmlError> {
        let mut out = Vec::new();
        let handle: SerializableHandle = self.dom.document.clone().into();
        serialize(&mut out, &handle, SerializeOpts::default())
            .map_err(|e| Md2HtmlError::Internal(format!("HTML serialisation failed: {e}")))?;
        String::from_utf8(out)
            .map_err(|e| Md2HtmlError::Internal(format!("HTML serialisation produced invalid UTF-8: {e}")))
    }

    /// The document node.
    pub fn document(&self) -> &Handle {
        &self.dom.document
    }

    /// The `<html>` element.
    pub fn root(&self) -> Option<Handle> {
        self.dom
            .document
            .children
            .borrow()
            .iter()
            .find(|c| is_element(c, "html"))
            .cloned()
    }

    pub fn head(&self) -> Option<Handle> {
        self.root().and_then(|r| child_element(&r, "head"))
    }

    pub fn body(&self) -> Option<Handle> {
        self.root().and_then(|r| child_element(&r, "body"))
    }

    /// All elements named `tag`, in document order.
    pub fn elements(&self, tag: &str) -> Vec<Handle> {
        descendants(&self.dom.document)
            .into_iter()
            .filter(|n| is_element(n, tag))
            .collect()
    }
}

/// Parse `markup` as body content and return the resulting top-level nodes,
/// detached and ready to be inserted into another document.
pub fn parse_fragment(markup: &str) -> Vec<Handle> {
    let doc = HtmlDocument::parse(&format!(
        "<!DOCTYPE html><html><head></head><body>{}</body></html>",
        markup.trim()
    ));
    let Some(body) = doc.body() else {
        return Vec::new();
    };
    let nodes: Vec<Handle> = body.children.borrow_mut().drain(..).collect();
    for node in &nodes {
        node.parent.set(None);
    }
    nodes
}

// ── Node inspection ──────────────────────────────────────────────────────

/// Local name of an element node.
pub fn tag_name(node: &Node) -> Option<&str> {
    match &node.data {
        NodeData::Element { name, .. } => Some(&*name.local),
        _ => None,
    }
}

pub fn is_element(node: &Node, tag: &str) -> bool {
    tag_name(node) == Some(tag)
}

/// Value of attribute `name`, if present.
pub fn attr(node: &Node, name: &str) -> Option<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|a| &*a.name.local == name)
            .map(|a| a.value.to_string()),
        _ => None,
    }
}

/// Content of a text node.
pub fn text(node: &Node) -> Option<String> {
    match &node.data {
        NodeData::Text { contents } => Some(contents.borrow().to_string()),
        _ => None,
    }
}

/// First child element named `tag`.
pub fn child_element(parent: &Handle, tag: &str) -> Option<Handle> {
    parent
        .children
        .borrow()
        .iter()
        .find(|c| is_element(c, tag))
        .cloned()
}

/// All nodes below `node` in document order (pre-order), excluding `node`.
pub fn descendants(node: &Handle) -> Vec<Handle> {
    let mut out = Vec::new();
    let mut stack: Vec<Handle> = node.children.borrow().iter().rev().cloned().collect();
    while let Some(current) = stack.pop() {
        stack.extend(current.children.borrow().iter().rev().cloned());
        out.push(current);
    }
    out
}

pub fn parent(node: &Handle) -> Option<Handle> {
    let weak = node.parent.take();
    let parent = weak.as_ref().and_then(|w| w.upgrade());
    node.parent.set(weak);
    parent
}

// ── Node construction ────────────────────────────────────────────────────

/// New HTML element with the given attributes, in order.
pub fn create_element(tag: &str, attributes: &[(&str, &str)]) -> Handle {
    let attrs = attributes
        .iter()
        .map(|(k, v)| Attribute {
            name: attr_name(k),
            value: StrTendril::from(*v),
        })
        .collect();
    Node::new(NodeData::Element {
        name: QualName::new(None, Namespace::from(HTML_NS), LocalName::from(tag)),
        attrs: RefCell::new(attrs),
        template_contents: RefCell::new(None),
        mathml_annotation_xml_integration_point: false,
    })
}

pub fn create_text(content: &str) -> Handle {
    Node::new(NodeData::Text {
        contents: RefCell::new(StrTendril::from(content)),
    })
}

fn attr_name(name: &str) -> QualName {
    QualName::new(None, Namespace::from(""), LocalName::from(name))
}

// ── Node mutation ────────────────────────────────────────────────────────

/// Set attribute `name`, replacing any existing value.
pub fn set_attr(node: &Node, name: &str, value: &str) {
    if let NodeData::Element { attrs, .. } = &node.data {
        let mut attrs = attrs.borrow_mut();
        match attrs.iter_mut().find(|a| &*a.name.local == name) {
            Some(existing) => existing.value = StrTendril::from(value),
            None => attrs.push(Attribute {
                name: attr_name(name),
                value: StrTendril::from(value),
            }),
        }
    }
}

/// Remove attribute `name`; returns whether it was present.
pub fn remove_attr(node: &Node, name: &str) -> bool {
    match &node.data {
        NodeData::Element { attrs, .. } => {
            let mut attrs = attrs.borrow_mut();
            let before = attrs.len();
            attrs.retain(|a| &*a.name.local != name);
            attrs.len() != before
        }
        _ => false,
    }
}

/// Remove `node` from its parent. No-op for detached nodes.
pub fn detach(node: &Handle) {
    if let Some(weak) = node.parent.take() {
        if let Some(parent) = weak.upgrade() {
            parent
                .children
                .borrow_mut()
                .retain(|c| !Rc::ptr_eq(c, node));
        }
    }
}

pub fn append_child(parent: &Handle, child: Handle) {
    detach(&child);
    child.parent.set(Some(Rc::downgrade(parent)));
    parent.children.borrow_mut().push(child);
}

/// Insert `child` at `index` (clamped to the child count).
pub fn insert_child(parent: &Handle, index: usize, child: Handle) {
    detach(&child);
    child.parent.set(Some(Rc::downgrade(parent)));
    let mut children = parent.children.borrow_mut();
    let index = index.min(children.len());
    children.insert(index, child);
}

/// Replace `node` with `replacements`, keeping their order.
pub fn replace_with(node: &Handle, replacements: Vec<Handle>) {
    let Some(parent) = parent(node) else {
        return;
    };
    for r in &replacements {
        detach(r);
        r.parent.set(Some(Rc::downgrade(&parent)));
    }
    let mut children = parent.children.borrow_mut();
    if let Some(pos) = children.iter().position(|c| Rc::ptr_eq(c, node)) {
        children.splice(pos..=pos, replacements);
        node.parent.set(None);
    }
}
