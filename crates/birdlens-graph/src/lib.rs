//! In-memory entity graph built from Twitter API step results.
//!
//! Executed steps are folded into a graph of users, tweets, lists,
//! communities and spaces, with typed edges for the relationships the
//! endpoint responses expose (posted, follows, reply/quote/retweet links,
//! mentions, list membership, space roles). The graph accumulates across
//! a session and serializes to a deterministic snapshot.

mod graph;
mod ingest;

pub use graph::{Edge, EdgeKind, EntityGraph, GraphSnapshot, Node, NodeKind};
