// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use smallvec::SmallVec;

/// Most trie nodes in practice have few children.
const INLINE_EDGES: usize = 4;

/// An immutable set of byte strings that [`Buffer::select()`][crate::Buffer::select] matches the
/// start of a buffer against.
///
/// Options are identified by their registration index. When more than one option is a prefix of
/// the input, the one registered first wins. An option that has an earlier-registered prefix
/// among the options can therefore never be selected.
///
/// ```
/// use segbuf::{Buffer, Options};
///
/// let options = Options::new(["GET ", "POST ", "PUT "]);
/// let mut buffer = Buffer::from("POST /index.html");
///
/// assert_eq!(buffer.select(&options), Some(1));
/// assert_eq!(buffer.read_to_vec(), b"/index.html");
/// ```
#[derive(Clone, Debug)]
pub struct Options {
    options: Vec<Box<[u8]>>,

    /// Node 0 is the root.
    nodes: Vec<Node>,
}

#[derive(Clone, Debug, Default)]
struct Node {
    edges: SmallVec<[(u8, u32); INLINE_EDGES]>,

    /// The smallest index among the options that end exactly at this node.
    terminal: Option<usize>,

    /// The smallest index among the options that end strictly below this node.
    deeper: Option<usize>,
}

impl Node {
    fn child(&self, byte: u8) -> Option<usize> {
        self.edges
            .iter()
            .find(|(edge, _)| *edge == byte)
            .map(|(_, child)| *child as usize)
    }
}

/// The outcome of matching buffered bytes against [`Options`] without consuming them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Selection {
    /// The option with this index is the winning match.
    Matched(usize),

    /// No option can match, whatever bytes follow.
    NoMatch,

    /// The bytes seen so far are consistent with an option that has not been fully seen yet and
    /// that would win over any match found so far.
    NeedMoreData {
        /// The option that wins if no more bytes ever arrive.
        best_so_far: Option<usize>,
    },
}

impl Options {
    /// Builds the option set. Indexes follow the iteration order.
    ///
    /// # Panics
    ///
    /// Panics if any option is empty.
    #[must_use]
    pub fn new<I, B>(options: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        let options: Vec<Box<[u8]>> = options.into_iter().map(|o| Box::from(o.as_ref())).collect();

        let mut nodes = vec![Node::default()];

        for (index, option) in options.iter().enumerate() {
            assert!(!option.is_empty(), "the empty byte string is not a supported option");

            let mut current = 0;

            for &byte in option.iter() {
                let node = &mut nodes[current];
                node.deeper = Some(node.deeper.map_or(index, |d| d.min(index)));

                current = match node.child(byte) {
                    Some(child) => child,
                    None => {
                        let child = nodes.len();
                        nodes[current]
                            .edges
                            .push((byte, u32::try_from(child).expect("trie exceeds u32::MAX nodes")));
                        nodes.push(Node::default());
                        child
                    }
                };
            }

            let node = &mut nodes[current];
            node.terminal = Some(node.terminal.map_or(index, |t| t.min(index)));
        }

        Self { options, nodes }
    }

    /// The number of options.
    #[must_use]
    pub fn len(&self) -> usize {
        self.options.len()
    }

    /// Whether the set has no options, in which case nothing ever matches.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    /// The bytes of the option with the given index.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&[u8]> {
        self.options.get(index).map(AsRef::as_ref)
    }

    /// Iterates over the options in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.options.iter().map(AsRef::as_ref)
    }

    /// Matches the start of `input` against the options.
    ///
    /// Stops reading as soon as the winner is certain, so `input` may be arbitrarily long.
    pub(crate) fn evaluate(&self, input: impl IntoIterator<Item = u8>) -> Selection {
        let mut best: Option<usize> = None;
        let mut node = &self.nodes[0];

        for byte in input {
            if let Some(terminal) = node.terminal {
                best = Some(best.map_or(terminal, |b| b.min(terminal)));
            }

            if !can_improve(node, best) {
                return best.map_or(Selection::NoMatch, Selection::Matched);
            }

            match node.child(byte) {
                Some(child) => node = &self.nodes[child],
                None => return best.map_or(Selection::NoMatch, Selection::Matched),
            }
        }

        if let Some(terminal) = node.terminal {
            best = Some(best.map_or(terminal, |b| b.min(terminal)));
        }

        if can_improve(node, best) {
            Selection::NeedMoreData { best_so_far: best }
        } else {
            best.map_or(Selection::NoMatch, Selection::Matched)
        }
    }
}

/// Whether an option that continues below `node` would win over `best`.
fn can_improve(node: &Node, best: Option<usize>) -> bool {
    match (node.deeper, best) {
        (None, _) => false,
        (Some(_), None) => true,
        (Some(deeper), Some(best)) => deeper < best,
    }
}

impl<B: AsRef<[u8]>> FromIterator<B> for Options {
    fn from_iter<I: IntoIterator<Item = B>>(iter: I) -> Self {
        Self::new(iter)
    }
}
