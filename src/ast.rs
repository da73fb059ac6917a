//! Abstract syntax
//!
//! The reader produces these nodes and the compiler consumes them; they
//! live only for the duration of compilation. A program is a tree of
//! pairs over fixnum and atom leaves, terminated by the shared empty
//! list.

use std::fmt;

/// A node of the source program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AstNode {
    /// Decimal integer literal.
    Fixnum(i64),
    /// Symbol; names compare by value.
    Atom(String),
    /// `(car . cdr)`.
    Pair(Box<AstNode>, Box<AstNode>),
    /// The distinguished empty list.
    Nil,
}

impl AstNode {
    /// An atom node owning its name.
    pub fn atom(name: &str) -> Self {
        AstNode::Atom(name.to_owned())
    }

    /// Build a pair; with both operands absent this is the shared empty
    /// list.
    pub fn pair(car: Option<AstNode>, cdr: Option<AstNode>) -> Self {
        match (car, cdr) {
            (None, None) => AstNode::Nil,
            (car, cdr) => AstNode::Pair(
                Box::new(car.unwrap_or(AstNode::Nil)),
                Box::new(cdr.unwrap_or(AstNode::Nil)),
            ),
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, AstNode::Nil)
    }

    /// Name of an atom node.
    pub fn as_atom(&self) -> Option<&str> {
        match self {
            AstNode::Atom(name) => Some(name),
            _ => None,
        }
    }

    /// First element of a pair. The source is malformed if this is
    /// reached on anything else, which is fatal.
    pub fn car(&self) -> &AstNode {
        match self {
            AstNode::Pair(car, _) => car,
            node => panic!("car of non-pair {}", node),
        }
    }

    /// Rest of a pair. Fatal on non-pairs, as with [`AstNode::car`].
    pub fn cdr(&self) -> &AstNode {
        match self {
            AstNode::Pair(_, cdr) => cdr,
            node => panic!("cdr of non-pair {}", node),
        }
    }

    /// Iterate the elements of a proper list.
    pub fn iter(&self) -> ListIter<'_> {
        ListIter { node: self }
    }
}

/// Iterator over the `car`s of a right-nested pair chain.
pub struct ListIter<'a> {
    node: &'a AstNode,
}

impl<'a> Iterator for ListIter<'a> {
    type Item = &'a AstNode;

    fn next(&mut self) -> Option<&'a AstNode> {
        match self.node {
            AstNode::Pair(car, cdr) => {
                self.node = cdr;
                Some(car)
            }
            _ => None,
        }
    }
}

impl fmt::Display for AstNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AstNode::Fixnum(n) => write!(f, "{}", n),
            AstNode::Atom(name) => write!(f, "{}", name),
            AstNode::Nil => write!(f, "()"),
            AstNode::Pair(..) => {
                write!(f, "(")?;
                let mut node = self;
                let mut first = true;
                loop {
                    match node {
                        AstNode::Pair(car, cdr) => {
                            if !first {
                                write!(f, " ")?;
                            }
                            write!(f, "{}", car)?;
                            first = false;
                            node = cdr;
                        }
                        AstNode::Nil => break,
                        tail => {
                            write!(f, " . {}", tail)?;
                            break;
                        }
                    }
                }
                write!(f, ")")
            }
        }
    }
}
