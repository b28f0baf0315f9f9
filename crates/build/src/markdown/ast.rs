//! The document tree the content transform works on.
//!
//! The tree is produced by an external markdown parser and handed back to it after the
//! transform, so it round trips through serde in the parser's own shape: a `type` tag,
//! `tagName` for elements and a free form `properties` object.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::mem;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Node {
    Root {
        #[serde(default)]
        children: Vec<Node>,
    },
    #[serde(rename_all = "camelCase")]
    Element {
        tag_name: String,
        #[serde(default)]
        properties: Map<String, Value>,
        #[serde(default)]
        children: Vec<Node>,
    },
    Text {
        value: String,
    },
    Comment {
        value: String,
    },
    /// A named export bound to a literal value, emitted by the transform.
    Export {
        name: String,
        value: Value,
    },
    /// Any other node kind the parser emits, such as `doctype`, `raw` or mdx nodes, kept as is.
    #[serde(untagged)]
    Other(Map<String, Value>),
}

impl Node {
    pub fn root(children: Vec<Node>) -> Self {
        Node::Root { children }
    }

    pub fn element(tag_name: impl Into<String>, children: Vec<Node>) -> Self {
        Node::Element { tag_name: tag_name.into(), properties: Map::new(), children }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Node::Text { value: value.into() }
    }

    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        if let Node::Element { properties, .. } = &mut self {
            properties.insert(name.into(), value.into());
        }
        self
    }

    pub fn children(&self) -> &[Node] {
        match self {
            Node::Root { children } | Node::Element { children, .. } => children,
            _ => &[],
        }
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        match self {
            Node::Element { properties, .. } => properties.get(name),
            _ => None,
        }
    }

    /// Whether the element carries `name` with a value other than `null` or `false`.
    pub fn has_property(&self, name: &str) -> bool {
        !matches!(self.property(name), None | Some(Value::Null | Value::Bool(false)))
    }

    pub fn set_property(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        if let Node::Element { properties, .. } = self {
            properties.insert(name.into(), value.into());
        }
    }

    pub fn is_element(&self, tag: &str) -> bool {
        matches!(self, Node::Element { tag_name, .. } if tag_name.eq_ignore_ascii_case(tag))
    }

    /// `1..=6` for `h1` to `h6`.
    pub fn heading_rank(&self) -> Option<u8> {
        let Node::Element { tag_name, .. } = self else {
            return None;
        };
        match tag_name.to_ascii_lowercase().as_bytes() {
            [b'h', level @ b'1'..=b'6'] => Some(level - b'0'),
            _ => None,
        }
    }

    /// The concatenated text of every text node below this one.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match self {
            Node::Text { value } => out.push_str(value),
            Node::Root { children } | Node::Element { children, .. } => {
                children.iter().for_each(|child| child.collect_text(out));
            }
            Node::Comment { .. } | Node::Export { .. } | Node::Other(_) => {}
        }
    }

    /// Visits every element in document order, parents before their children.
    pub fn visit_elements_mut(&mut self, f: &mut impl FnMut(&mut Node)) {
        if matches!(self, Node::Element { .. }) {
            f(self);
        }
        if let Node::Root { children } | Node::Element { children, .. } = self {
            for child in children {
                child.visit_elements_mut(f);
            }
        }
    }

    /// Inserts `node` as the first child of the root, wrapping a non root tree first.
    pub fn unshift(&mut self, node: Node) {
        if !matches!(self, Node::Root { .. }) {
            let inner = mem::replace(self, Node::root(Vec::new()));
            *self = Node::root(vec![inner]);
        }
        if let Node::Root { children } = self {
            children.insert(0, node);
        }
    }

    /// The value bound by the export named `name`, if the root has one.
    pub fn export(&self, name: &str) -> Option<&Value> {
        self.children().iter().find_map(|child| match child {
            Node::Export { name: export, value } if export == name => Some(value),
            _ => None,
        })
    }
}
