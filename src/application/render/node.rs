//! Output tree produced by fence rules.
//!
//! Static markup is kept as pre-rendered HTML; run controls stay live so the
//! document can be re-rendered as their state changes.

use std::{fmt, sync::Arc};

use crate::application::run::RunController;

pub enum RenderNode {
    /// Trusted, already rendered markup.
    Html(String),
    /// Text that is escaped on output.
    Text(String),
    Element(Element),
    Control(Arc<RunController>),
}

impl RenderNode {
    /// Child list of the node, if it has one.
    pub fn children(&self) -> Option<&[RenderNode]> {
        match self {
            RenderNode::Element(element) => Some(element.children.as_slice()),
            _ => None,
        }
    }

    /// Composite of this node with `child` appended to its children.
    ///
    /// Leaves have no child list and come back unchanged as `Err`.
    pub fn with_child(self, child: RenderNode) -> Result<RenderNode, RenderNode> {
        match self {
            RenderNode::Element(element) => Ok(RenderNode::Element(element.child(child))),
            leaf => Err(leaf),
        }
    }

    /// Run controls in document order.
    pub fn controls(&self) -> Vec<Arc<RunController>> {
        let mut found = Vec::new();
        self.collect_controls(&mut found);
        found
    }

    fn collect_controls(&self, found: &mut Vec<Arc<RunController>>) {
        match self {
            RenderNode::Control(controller) => found.push(Arc::clone(controller)),
            RenderNode::Element(element) => {
                for child in &element.children {
                    child.collect_controls(found);
                }
            }
            RenderNode::Html(_) | RenderNode::Text(_) => {}
        }
    }

    pub fn to_html(&self) -> String {
        let mut html = String::new();
        self.write_html(&mut html);
        html
    }

    pub fn write_html(&self, out: &mut String) {
        match self {
            RenderNode::Html(html) => out.push_str(html),
            RenderNode::Text(text) => out.push_str(&ammonia::clean_text(text)),
            RenderNode::Element(element) => element.write_html(out),
            RenderNode::Control(controller) => controller.render().write_html(out),
        }
    }
}

impl From<Element> for RenderNode {
    fn from(element: Element) -> Self {
        RenderNode::Element(element)
    }
}

impl fmt::Debug for RenderNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderNode::Html(html) => f.debug_tuple("Html").field(html).finish(),
            RenderNode::Text(text) => f.debug_tuple("Text").field(text).finish(),
            RenderNode::Element(element) => f.debug_tuple("Element").field(element).finish(),
            RenderNode::Control(controller) => {
                f.debug_tuple("Control").field(controller.as_ref()).finish()
            }
        }
    }
}

#[derive(Debug)]
pub struct Element {
    tag: String,
    attributes: Vec<(String, String)>,
    children: Vec<RenderNode>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    pub fn child(mut self, child: impl Into<RenderNode>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    fn write_html(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.tag);
        for (name, value) in &self.attributes {
            out.push(' ');
            out.push_str(name);
            out.push_str("=\"");
            out.push_str(&ammonia::clean_text(value));
            out.push('"');
        }
        out.push('>');
        for child in &self.children {
            child.write_html(out);
        }
        out.push_str("</");
        out.push_str(&self.tag);
        out.push('>');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elements_render_with_escaped_attributes_and_text() {
        let node: RenderNode = Element::new("div")
            .attr("class", "code-block")
            .attr("title", "a \"quoted\" <title>")
            .child(RenderNode::Text("1 < 2 & 3".into()))
            .child(RenderNode::Html("<br>".into()))
            .into();

        let RenderNode::Element(element) = &node else {
            panic!("expected an element, got {node:?}");
        };
        assert_eq!(element.tag(), "div");
        assert_eq!(element.attribute("class"), Some("code-block"));
        assert_eq!(element.attribute("missing"), None);

        let html = node.to_html();
        assert!(html.starts_with("<div class=\"code-block\" title=\""));
        assert!(html.contains("&quot;quoted&quot;"));
        assert!(html.contains("1&#32;&lt;&#32;2&#32;&amp;&#32;3<br></div>"), "{html}");
    }

    #[test]
    fn with_child_appends_to_elements_only() {
        let element: RenderNode = Element::new("div").into();
        let composite = element
            .with_child(RenderNode::Html("<span></span>".into()))
            .expect("elements accept children");
        assert_eq!(composite.children().map(<[_]>::len), Some(1));
        assert_eq!(composite.to_html(), "<div><span></span></div>");

        let leaf = RenderNode::Html("<pre>x</pre>".into());
        let unchanged = leaf
            .with_child(RenderNode::Text("ignored".into()))
            .expect_err("leaves have no child list");
        assert_eq!(unchanged.to_html(), "<pre>x</pre>");
        assert!(unchanged.children().is_none());
    }
}
