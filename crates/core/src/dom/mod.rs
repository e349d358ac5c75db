use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use html5ever::tree_builder::TreeBuilderOpts;
use html5ever::ParseOpts;
use markup5ever_rcdom::{Handle, NodeData, RcDom};
use std::collections::HashMap;

pub mod selector;

pub use selector::SelectorList;

/// A node of the parsed page: only what extraction needs.
#[derive(Debug, Clone)]
pub struct DomNode {
    pub tag: String,
    pub attributes: HashMap<String, String>,
    pub text: String,
    pub children: Vec<DomNode>,
    pub node_type: NodeType,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeType {
    Element,
    Text,
    Document,
}

impl DomNode {
    pub fn new_element(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            attributes: HashMap::new(),
            text: String::new(),
            children: Vec::new(),
            node_type: NodeType::Element,
        }
    }

    pub fn new_text(text: &str) -> Self {
        Self {
            tag: String::new(),
            attributes: HashMap::new(),
            text: text.to_string(),
            children: Vec::new(),
            node_type: NodeType::Text,
        }
    }

    pub fn new_document() -> Self {
        Self {
            tag: String::new(),
            attributes: HashMap::new(),
            text: String::new(),
            children: Vec::new(),
            node_type: NodeType::Document,
        }
    }

    pub fn is_element(&self) -> bool {
        self.node_type == NodeType::Element
    }

    pub fn get_attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(|s| s.as_str())
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.get_attr("class")
            .map(|c| c.split_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }

    /// Element children only, in document order.
    pub fn element_children(&self) -> impl Iterator<Item = &DomNode> {
        self.children.iter().filter(|c| c.is_element())
    }

    /// All descendants matching a CSS selector, in document order.
    /// The node itself is never part of the result.
    pub fn select(&self, selector: &str) -> Vec<&DomNode> {
        match SelectorList::parse(selector) {
            Some(list) => list.select_all(self),
            None => {
                tracing::warn!(selector, "unsupported selector");
                Vec::new()
            }
        }
    }

    /// First descendant matching a CSS selector.
    pub fn select_first(&self, selector: &str) -> Option<&DomNode> {
        self.select(selector).into_iter().next()
    }

    /// Text of the first descendant matching `selector`, whitespace collapsed.
    pub fn select_text(&self, selector: &str) -> Option<String> {
        self.select_first(selector).map(|n| n.text_content())
    }

    /// Attribute of the first descendant matching `selector`.
    pub fn select_attr(&self, selector: &str, attr: &str) -> Option<String> {
        self.select_first(selector)
            .and_then(|n| n.get_attr(attr))
            .map(|s| s.to_string())
    }

    /// The text of this node and its descendants, concatenated as the page
    /// shows it, with whitespace runs collapsed to single spaces.
    pub fn text_content(&self) -> String {
        self.text_content_without(&|_| false)
    }

    /// Text content, skipping every subtree for which `skip` returns true.
    pub fn text_content_without(&self, skip: &dyn Fn(&DomNode) -> bool) -> String {
        let mut raw = String::new();
        self.collect_text(&mut raw, skip);
        normalize_whitespace(&raw)
    }

    fn collect_text(&self, out: &mut String, skip: &dyn Fn(&DomNode) -> bool) {
        match self.node_type {
            NodeType::Text => out.push_str(&self.text),
            _ => {
                for child in &self.children {
                    if child.is_element() && skip(child) {
                        continue;
                    }
                    // Block boxes start on their own line even without
                    // whitespace in the markup
                    let breaks = child.is_element() && is_block(&child.tag);
                    if breaks {
                        out.push(' ');
                    }
                    child.collect_text(out, skip);
                    if breaks {
                        out.push(' ');
                    }
                }
            }
        }
    }
}

fn is_block(tag: &str) -> bool {
    matches!(
        tag,
        "address"
            | "article"
            | "aside"
            | "blockquote"
            | "br"
            | "dd"
            | "div"
            | "dl"
            | "dt"
            | "footer"
            | "form"
            | "h1"
            | "h2"
            | "h3"
            | "h4"
            | "h5"
            | "h6"
            | "header"
            | "hr"
            | "li"
            | "nav"
            | "ol"
            | "option"
            | "p"
            | "section"
            | "table"
            | "tbody"
            | "td"
            | "tfoot"
            | "th"
            | "thead"
            | "tr"
            | "ul"
    )
}

/// The chain of ancestors from `root` down to (excluding) `target`,
/// or `None` when `target` is not inside `root`.
pub fn ancestors_of<'a>(root: &'a DomNode, target: &DomNode) -> Option<Vec<&'a DomNode>> {
    let mut path = Vec::new();
    if find_path(root, target, &mut path) {
        Some(path)
    } else {
        None
    }
}

fn find_path<'a>(node: &'a DomNode, target: &DomNode, path: &mut Vec<&'a DomNode>) -> bool {
    if std::ptr::eq(node, target) {
        return true;
    }
    path.push(node);
    for child in &node.children {
        if find_path(child, target, path) {
            return true;
        }
    }
    path.pop();
    false
}

/// Collapse runs of whitespace into single spaces and trim.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse an HTML string (document or fragment) into a DomNode tree.
pub fn parse_html(html: &str) -> DomNode {
    let opts = ParseOpts {
        tree_builder: TreeBuilderOpts {
            drop_doctype: true,
            ..Default::default()
        },
        ..Default::default()
    };

    let dom = parse_document(RcDom::default(), opts).one(html);

    convert_node(&dom.document)
}

fn convert_node(handle: &Handle) -> DomNode {
    match &handle.data {
        NodeData::Document => {
            let mut doc = DomNode::new_document();
            for child in handle.children.borrow().iter() {
                doc.children.push(convert_node(child));
            }
            doc
        }
        NodeData::Element { name, attrs, .. } => {
            let tag = name.local.to_string();

            let mut node = DomNode::new_element(&tag);
            for attr in attrs.borrow().iter() {
                node.attributes
                    .insert(attr.name.local.to_string(), attr.value.to_string());
            }

            // Script and style bodies never carry data
            if tag == "script" || tag == "style" {
                return node;
            }

            for child in handle.children.borrow().iter() {
                let child_node = convert_node(child);
                // Comments, PIs, doctypes come back as empty documents
                if child_node.node_type == NodeType::Document && child_node.children.is_empty() {
                    continue;
                }
                node.children.push(child_node);
            }
            node
        }
        NodeData::Text { contents } => {
            let text = contents.borrow().to_string();
            DomNode::new_text(&text)
        }
        _ => DomNode::new_document(),
    }
}
