//! Document model the controller mutates.
//!
//! [`Document`] is the narrow surface the controller and animators need from
//! a page: look elements up by id, change opacity, replace content, and
//! offset the n-th descendant carrying a class. [`MemoryDocument`] is a
//! plain element tree that renders to HTML.

use std::fmt::Write as _;
use std::sync::Arc;

use agent_stage_core::config::DocumentConfig;
use agent_stage_core::types::AgentId;
use tokio::sync::Mutex;

/// A document shared between the controller and running animations.
pub type SharedDocument<D> = Arc<Mutex<D>>;

/// Inline style properties the stage animates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Style {
    pub opacity: Option<f32>,
    pub translate_y: Option<f32>,
}

/// A document node.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

impl Node {
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        }
    }
}

/// An element with an optional id, classes, style, and children.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub tag: String,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub style: Style,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            id: None,
            classes: Vec::new(),
            style: Style::default(),
            children: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.style.opacity = Some(opacity);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }

    /// Child elements, skipping text nodes.
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(Node::as_element)
    }

    /// Descendant elements carrying `class`, in document order.
    pub fn descendants_with_class<'a>(&'a self, class: &str) -> Vec<&'a Element> {
        let mut out = Vec::new();
        collect_with_class(self, class, &mut out);
        out
    }
}

fn collect_text(el: &Element, out: &mut String) {
    for child in &el.children {
        match child {
            Node::Text(t) => out.push_str(t),
            Node::Element(e) => collect_text(e, out),
        }
    }
}

fn collect_with_class<'a>(el: &'a Element, class: &str, out: &mut Vec<&'a Element>) {
    for child in el.child_elements() {
        if child.has_class(class) {
            out.push(child);
        }
        collect_with_class(child, class, out);
    }
}

fn find<'a>(el: &'a Element, id: &str) -> Option<&'a Element> {
    if el.id.as_deref() == Some(id) {
        return Some(el);
    }
    el.child_elements().find_map(|child| find(child, id))
}

fn find_mut<'a>(el: &'a mut Element, id: &str) -> Option<&'a mut Element> {
    if el.id.as_deref() == Some(id) {
        return Some(el);
    }
    for child in el.children.iter_mut() {
        if let Node::Element(child) = child {
            if let Some(found) = find_mut(child, id) {
                return Some(found);
            }
        }
    }
    None
}

/// Give the matching descendants of `el` the next offsets, in document order.
fn assign_offsets(el: &mut Element, class: &str, offsets: &[f32], next: &mut usize) {
    for child in el.children.iter_mut() {
        if *next >= offsets.len() {
            return;
        }
        if let Node::Element(child) = child {
            if child.has_class(class) {
                child.style.translate_y = Some(offsets[*next]);
                *next += 1;
            }
            assign_offsets(child, class, offsets, next);
        }
    }
}

/// What the controller and animators need from a page.
///
/// Every mutator returns `false` when its target does not exist, and leaves
/// the document untouched in that case.
pub trait Document: Send + 'static {
    /// Whether an element with this id exists.
    fn contains(&self, id: &str) -> bool;

    /// Current opacity of an element (1.0 when unset).
    fn opacity(&self, id: &str) -> Option<f32>;

    fn set_opacity(&mut self, id: &str, opacity: f32) -> bool;

    /// Replace an element's content with a single text node.
    fn set_text(&mut self, id: &str, text: &str) -> bool;

    fn replace_children(&mut self, id: &str, children: Vec<Node>) -> bool;

    /// Number of descendants of `root_id` carrying `class`.
    fn count_class(&self, root_id: &str, class: &str) -> usize;

    /// Set the vertical offsets of the descendants of `root_id` carrying
    /// `class`: the `i`-th one gets `offsets[i]`. Fails without writing when
    /// fewer than `offsets.len()` descendants match.
    fn set_offsets(&mut self, root_id: &str, class: &str, offsets: &[f32]) -> bool;
}

/// An in-memory element tree.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryDocument {
    body: Element,
}

impl Default for MemoryDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocument {
    pub fn new() -> Self {
        Self {
            body: Element::new("body"),
        }
    }

    /// A stage with a hidden container and an empty text element per agent.
    pub fn with_agents(agents: &[AgentId], names: &DocumentConfig) -> Self {
        let mut doc = Self::new();
        for agent in agents {
            doc.append(
                Element::new("div")
                    .with_id(names.container_id(agent))
                    .with_opacity(0.0)
                    .with_child(Element::new("p").with_id(names.text_id(agent))),
            );
        }
        doc
    }

    /// Append an element to the body.
    pub fn append(&mut self, element: Element) {
        self.body.children.push(Node::Element(element));
    }

    pub fn get(&self, id: &str) -> Option<&Element> {
        find(&self.body, id)
    }

    pub fn body(&self) -> &Element {
        &self.body
    }

    /// Render the body's content as HTML.
    pub fn render_html(&self) -> String {
        let mut out = String::new();
        for child in &self.body.children {
            render_node(child, &mut out);
        }
        out
    }
}

fn render_node(node: &Node, out: &mut String) {
    match node {
        Node::Text(t) => out.push_str(&escape(t)),
        Node::Element(el) => {
            out.push('<');
            out.push_str(&el.tag);
            if let Some(id) = &el.id {
                let _ = write!(out, " id=\"{}\"", escape(id));
            }
            if !el.classes.is_empty() {
                let _ = write!(out, " class=\"{}\"", escape(&el.classes.join(" ")));
            }
            let mut style = Vec::new();
            if let Some(opacity) = el.style.opacity {
                style.push(format!("opacity: {opacity}"));
            }
            if let Some(y) = el.style.translate_y {
                style.push(format!("transform: translateY({y}px)"));
            }
            if !style.is_empty() {
                let _ = write!(out, " style=\"{}\"", style.join("; "));
            }
            out.push('>');
            for child in &el.children {
                render_node(child, out);
            }
            let _ = write!(out, "</{}>", el.tag);
        }
    }
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

impl Document for MemoryDocument {
    fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    fn opacity(&self, id: &str) -> Option<f32> {
        self.get(id).map(|el| el.style.opacity.unwrap_or(1.0))
    }

    fn set_opacity(&mut self, id: &str, opacity: f32) -> bool {
        match find_mut(&mut self.body, id) {
            Some(el) => {
                el.style.opacity = Some(opacity.clamp(0.0, 1.0));
                true
            }
            None => false,
        }
    }

    fn set_text(&mut self, id: &str, text: &str) -> bool {
        self.replace_children(id, vec![Node::Text(text.to_string())])
    }

    fn replace_children(&mut self, id: &str, children: Vec<Node>) -> bool {
        match find_mut(&mut self.body, id) {
            Some(el) => {
                el.children = children;
                true
            }
            None => false,
        }
    }

    fn count_class(&self, root_id: &str, class: &str) -> usize {
        self.get(root_id)
            .map(|el| el.descendants_with_class(class).len())
            .unwrap_or(0)
    }

    fn set_offsets(&mut self, root_id: &str, class: &str, offsets: &[f32]) -> bool {
        let Some(root) = find_mut(&mut self.body, root_id) else {
            return false;
        };
        if root.descendants_with_class(class).len() < offsets.len() {
            return false;
        }
        let mut next = 0;
        assign_offsets(root, class, offsets, &mut next);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage() -> MemoryDocument {
        MemoryDocument::with_agents(&[AgentId::from(1u32), AgentId::from(2u32)], &DocumentConfig::default())
    }

    #[test]
    fn test_with_agents_layout() {
        let doc = stage();
        assert!(doc.contains("agent-container-1"));
        assert!(doc.contains("agent-text-2"));
        assert!(!doc.contains("agent-container-3"));
        assert_eq!(doc.opacity("agent-container-1"), Some(0.0));
        // Unstyled elements are fully opaque.
        assert_eq!(doc.opacity("agent-text-1"), Some(1.0));
    }

    #[test]
    fn test_set_opacity_missing_is_noop() {
        let mut doc = stage();
        let before = doc.clone();
        assert!(!doc.set_opacity("agent-container-9", 1.0));
        assert_eq!(doc, before);
    }

    #[test]
    fn test_set_opacity_clamps() {
        let mut doc = stage();
        assert!(doc.set_opacity("agent-container-1", 1.7));
        assert_eq!(doc.opacity("agent-container-1"), Some(1.0));
    }

    #[test]
    fn test_set_text_replaces_content() {
        let mut doc = stage();
        assert!(doc.set_text("agent-text-1", "hello"));
        assert!(doc.set_text("agent-text-1", "again"));
        assert_eq!(doc.get("agent-text-1").unwrap().text_content(), "again");
        assert!(!doc.set_text("agent-text-7", "x"));
    }

    fn word_and_space(doc: &mut MemoryDocument) {
        let word = Element::new("span")
            .with_class("agent-word")
            .with_child(Element::new("span").with_class("agent-letter").with_text("a"))
            .with_child(Element::new("span").with_class("agent-letter").with_text("b"));
        let space = Element::new("span").with_class("agent-letter").with_text(" ");
        doc.replace_children("agent-text-1", vec![Node::Element(word), Node::Element(space)]);
    }

    #[test]
    fn test_set_offsets_in_document_order() {
        let mut doc = stage();
        word_and_space(&mut doc);

        assert_eq!(doc.count_class("agent-text-1", "agent-letter"), 3);
        assert!(doc.set_offsets("agent-text-1", "agent-letter", &[0.0, -2.0, -1.0]));

        let letters = doc.get("agent-text-1").unwrap().descendants_with_class("agent-letter");
        let offsets: Vec<Option<f32>> = letters.iter().map(|l| l.style.translate_y).collect();
        assert_eq!(offsets, vec![Some(0.0), Some(-2.0), Some(-1.0)]);
        // The word wrapper itself is not a letter.
        let word = doc.get("agent-text-1").unwrap().child_elements().next().unwrap();
        assert_eq!(word.style.translate_y, None);
    }

    #[test]
    fn test_set_offsets_prefix_and_mismatch() {
        let mut doc = stage();
        word_and_space(&mut doc);

        // Fewer offsets than letters touches only the leading letters.
        assert!(doc.set_offsets("agent-text-1", "agent-letter", &[-1.0]));
        let letters = doc.get("agent-text-1").unwrap().descendants_with_class("agent-letter");
        assert_eq!(letters[0].style.translate_y, Some(-1.0));
        assert_eq!(letters[1].style.translate_y, None);

        // More offsets than letters, or a missing root, writes nothing.
        let before = doc.clone();
        assert!(!doc.set_offsets("agent-text-1", "agent-letter", &[-2.0; 4]));
        assert!(!doc.set_offsets("agent-text-9", "agent-letter", &[-2.0]));
        assert_eq!(doc, before);
    }

    #[test]
    fn test_render_html() {
        let mut doc = MemoryDocument::new();
        doc.append(
            Element::new("div")
                .with_id("agent-container-1")
                .with_opacity(0.0)
                .with_child(Element::new("p").with_id("agent-text-1").with_text("a < b")),
        );
        assert_eq!(
            doc.render_html(),
            r#"<div id="agent-container-1" style="opacity: 0"><p id="agent-text-1">a &lt; b</p></div>"#
        );
    }
}
