//! Hierarchical namespace of named nodes.
//!
//! Each node carries a four-character name and optionally binds one object.
//! Nodes created by a declaration are linked to their parent on allocation
//! but only satisfy lookups once installed into the parent's child list;
//! the evaluator installs them in a separate step so a failed declaration
//! never leaves a half-visible name behind.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::error::Status;
use crate::object::{self, Object, ObjectRef};

pub type NodeRef = Rc<RefCell<Node>>;

/// Four-character node name, `[A-Z_][A-Z0-9_]{3}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NameSeg([u8; 4]);

impl NameSeg {
    pub fn new(raw: [u8; 4]) -> Result<Self, Status> {
        let lead_ok = matches!(raw[0], b'A'..=b'Z' | b'_');
        let rest_ok = raw[1..]
            .iter()
            .all(|&b| matches!(b, b'A'..=b'Z' | b'0'..=b'9' | b'_'));
        if lead_ok && rest_ok {
            Ok(Self(raw))
        } else {
            Err(Status::BadBytecode)
        }
    }

    pub const fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl fmt::Display for NameSeg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            write!(f, "{}", b as char)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for NameSeg {
    type Err = Status;

    fn from_str(s: &str) -> Result<Self, Status> {
        let bytes = s.as_bytes();
        if bytes.len() != 4 {
            return Err(Status::InvalidArgument);
        }
        Self::new([bytes[0], bytes[1], bytes[2], bytes[3]])
    }
}

#[derive(Debug)]
pub struct Node {
    pub name: NameSeg,
    parent: Weak<RefCell<Node>>,
    children: Vec<NodeRef>,
    /// The bound object, if any. Declarations bind most objects through a
    /// `Named` reference wrapper so that stores resolve against the binding
    /// site; use [`Namespace::bound_object`] to look through the wrapper.
    pub object: Option<ObjectRef>,
}

impl Node {
    fn new(name: NameSeg, parent: Weak<RefCell<Node>>) -> NodeRef {
        Rc::new(RefCell::new(Node {
            name,
            parent,
            children: Vec::new(),
            object: None,
        }))
    }

    pub fn parent(&self) -> Option<NodeRef> {
        self.parent.upgrade()
    }
}

/// The namespace tree. The root node is unnamed in AML terms; it carries
/// the reserved name `\___`.
#[derive(Debug)]
pub struct Namespace {
    root: NodeRef,
}

impl Default for Namespace {
    fn default() -> Self {
        Self::new()
    }
}

impl Namespace {
    pub fn new() -> Self {
        let root = Node::new(NameSeg(*b"\\___"), Weak::new());
        Self { root }
    }

    pub fn root(&self) -> NodeRef {
        self.root.clone()
    }

    pub fn is_root(&self, node: &NodeRef) -> bool {
        Rc::ptr_eq(node, &self.root)
    }

    /// Look `name` up among the installed children of `parent`.
    pub fn child(&self, parent: &NodeRef, name: NameSeg) -> Option<NodeRef> {
        parent
            .borrow()
            .children
            .iter()
            .find(|child| child.borrow().name == name)
            .cloned()
    }

    /// Allocate a node linked to `parent` but not yet installed. The node
    /// never satisfies lookups until [`Namespace::install`] runs.
    pub fn alloc(&self, parent: &NodeRef, name: NameSeg) -> NodeRef {
        Node::new(name, Rc::downgrade(parent))
    }

    /// Install `node` under its recorded parent, atomically with respect to
    /// lookups. Fails if the name is already taken.
    pub fn install(&mut self, node: &NodeRef) -> Result<(), Status> {
        let (name, parent) = {
            let n = node.borrow();
            (n.name, n.parent().ok_or(Status::InvalidArgument)?)
        };
        if self.child(&parent, name).is_some() {
            return Err(Status::AlreadyExists);
        }
        parent.borrow_mut().children.push(node.clone());
        Ok(())
    }

    /// Remove `node` from its parent's child list. Objects bound to the
    /// node stay alive for as long as references to them exist.
    pub fn uninstall(&mut self, node: &NodeRef) {
        let Some(parent) = node.borrow().parent() else {
            return;
        };
        parent.borrow_mut().children.retain(|child| !Rc::ptr_eq(child, node));
    }

    /// Resolve a textual path relative to `scope`. Accepts the same shapes
    /// a NameString encodes: a leading `\`, any run of `^`, and dot
    /// separated segments (`\_SB.PCI0`, `^^FOO`, `BAR0`). A single bare
    /// segment searches ancestors toward the root.
    pub fn find(&self, scope: &NodeRef, path: &str) -> Option<NodeRef> {
        let mut cursor = scope.clone();
        let mut rest = path;

        if let Some(stripped) = rest.strip_prefix('\\') {
            cursor = self.root();
            rest = stripped;
        } else {
            while let Some(stripped) = rest.strip_prefix('^') {
                let parent = cursor.borrow().parent()?;
                cursor = parent;
                rest = stripped;
            }
        }

        if rest.is_empty() {
            return Some(cursor);
        }

        let segments: Vec<NameSeg> = rest
            .split('.')
            .map(|s| s.parse().ok())
            .collect::<Option<_>>()?;

        if segments.len() == 1 && rest.len() == path.len() {
            // Unprefixed single segment: apply the ancestor search rule.
            return self.search_upward(&cursor, segments[0]);
        }

        for seg in segments {
            cursor = self.child(&cursor, seg)?;
        }
        Some(cursor)
    }

    /// The upsearch rule: look in `scope`, then each ancestor up to the
    /// root.
    pub fn search_upward(&self, scope: &NodeRef, name: NameSeg) -> Option<NodeRef> {
        let mut cursor = scope.clone();
        loop {
            if let Some(found) = self.child(&cursor, name) {
                return Some(found);
            }
            let parent = cursor.borrow().parent()?;
            cursor = parent;
        }
    }

    /// The object bound to `node` with any `Named` reference wrapper
    /// removed.
    pub fn bound_object(node: &NodeRef) -> Option<ObjectRef> {
        let obj = node.borrow().object.clone()?;
        let unwrapped = match &*obj.borrow() {
            Object::Reference(r) => r.inner.clone(),
            _ => obj.clone(),
        };
        Some(unwrapped)
    }

    /// Absolute dotted path of `node`, for diagnostics.
    pub fn path_of(node: &NodeRef) -> String {
        let mut segments = Vec::new();
        let mut cursor = node.clone();
        loop {
            let parent = cursor.borrow().parent();
            match parent {
                Some(parent) => {
                    segments.push(cursor.borrow().name.to_string());
                    cursor = parent;
                }
                None => break,
            }
        }
        let mut path = String::from("\\");
        path.push_str(&segments.iter().rev().map(String::as_str).collect::<Vec<_>>().join("."));
        path
    }
}

/// Bind `object` to a fresh installed child of `parent`, wrapping it in a
/// `Named` reference the way declarations do.
pub fn bind(
    ns: &mut Namespace,
    parent: &NodeRef,
    name: NameSeg,
    object: Object,
) -> Result<NodeRef, Status> {
    let node = ns.alloc(parent, name);
    node.borrow_mut().object = Some(object::internal_reference(
        crate::object::ReferenceKind::Named,
        object::wrap(object),
    ));
    ns.install(&node)?;
    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Object;

    fn seg(name: &str) -> NameSeg {
        name.parse().unwrap()
    }

    #[test]
    fn uninstalled_nodes_are_invisible() {
        let mut ns = Namespace::new();
        let node = ns.alloc(&ns.root(), seg("FOO_"));
        assert!(ns.child(&ns.root(), seg("FOO_")).is_none());

        ns.install(&node).unwrap();
        assert!(ns.child(&ns.root(), seg("FOO_")).is_some());
    }

    #[test]
    fn install_rejects_duplicates() {
        let mut ns = Namespace::new();
        let root = ns.root();
        bind(&mut ns, &root, seg("FOO_"), Object::Integer(1)).unwrap();

        let duplicate = ns.alloc(&root, seg("FOO_"));
        assert_eq!(ns.install(&duplicate), Err(Status::AlreadyExists));
    }

    #[test]
    fn upsearch_walks_ancestors() {
        let mut ns = Namespace::new();
        let root = ns.root();
        let sb = bind(&mut ns, &root, seg("_SB_"), Object::Device).unwrap();
        let pci = bind(&mut ns, &sb, seg("PCI0"), Object::Device).unwrap();
        bind(&mut ns, &root, seg("GLOB"), Object::Integer(9)).unwrap();

        let found = ns.search_upward(&pci, seg("GLOB")).unwrap();
        assert_eq!(Namespace::path_of(&found), "\\GLOB");
    }

    #[test]
    fn find_resolves_rooted_and_relative_paths() {
        let mut ns = Namespace::new();
        let root = ns.root();
        let sb = bind(&mut ns, &root, seg("_SB_"), Object::Device).unwrap();
        let pci = bind(&mut ns, &sb, seg("PCI0"), Object::Device).unwrap();

        assert!(ns.find(&root, "\\_SB_.PCI0").is_some());
        assert!(ns.find(&pci, "^PCI0").is_some());
        assert!(ns.find(&pci, "\\MISS").is_none());
    }
}
