//! DIMACS shortest-path input: graph and reference solution files.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub target: u32,
    pub weight: u32,
}

/// Directed graph in CSR form: `nodes[v]..nodes[v + 1]` indexes the outgoing
/// edges of `v`. Node ids are 0-based internally; the file format is 1-based.
#[derive(Debug, Clone)]
pub struct Graph {
    nodes: Vec<u32>,
    edges: Vec<Edge>,
}

impl Graph {
    pub fn from_dimacs(path: impl AsRef<Path>) -> Result<Self, Error> {
        Self::parse_dimacs(BufReader::new(File::open(path)?))
    }

    /// Parses the DIMACS shortest-path format: `c` comments, one
    /// `p sp <nodes> <edges>` problem line, then `a <from> <to> <weight>`
    /// arcs with 1-based endpoints.
    pub fn parse_dimacs<R: BufRead>(reader: R) -> Result<Self, Error> {
        let mut edges_per_node: Option<Vec<Vec<Edge>>> = None;
        let mut num_edges = 0usize;
        for line in reader.lines() {
            let line = line?;
            let mut tokens = line.split_whitespace();
            match tokens.next() {
                None | Some("c") => continue,
                Some("p") => {
                    if edges_per_node.is_some() {
                        return Err(Error::Malformed("duplicate problem line".into()));
                    }
                    if tokens.next() != Some("sp") {
                        return Err(Error::Malformed("problem type is not sp".into()));
                    }
                    let num_nodes: usize = parse_token(tokens.next(), "node count")?;
                    num_edges = parse_token(tokens.next(), "edge count")?;
                    edges_per_node = Some(vec![Vec::new(); num_nodes]);
                }
                Some("a") => {
                    let per_node = edges_per_node
                        .as_mut()
                        .ok_or_else(|| Error::Malformed("arc before problem line".into()))?;
                    let source: usize = parse_token(tokens.next(), "arc source")?;
                    let target: u32 = parse_token(tokens.next(), "arc target")?;
                    let weight: u32 = parse_token(tokens.next(), "arc weight")?;
                    if source == 0 || source > per_node.len() {
                        return Err(Error::Malformed(format!("arc source {source} out of range")));
                    }
                    if target == 0 || target as usize > per_node.len() {
                        return Err(Error::Malformed(format!("arc target {target} out of range")));
                    }
                    per_node[source - 1].push(Edge {
                        target: target - 1,
                        weight,
                    });
                }
                Some(other) => {
                    return Err(Error::Malformed(format!("unexpected line prefix {other:?}")));
                }
            }
        }
        let edges_per_node =
            edges_per_node.ok_or_else(|| Error::Malformed("missing problem line".into()))?;
        let mut nodes = Vec::with_capacity(edges_per_node.len() + 1);
        let mut edges = Vec::with_capacity(num_edges);
        nodes.push(0);
        for outgoing in &edges_per_node {
            edges.extend_from_slice(outgoing);
            nodes.push(edges.len() as u32);
        }
        Ok(Self { nodes, edges })
    }

    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.nodes.len() - 1
    }

    #[inline]
    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    #[inline]
    pub fn outgoing(&self, node: u32) -> &[Edge] {
        let begin = self.nodes[node as usize] as usize;
        let end = self.nodes[node as usize + 1] as usize;
        &self.edges[begin..end]
    }
}

/// Reads a reference solution: one `<node> <distance>` pair per line, in node
/// order.
pub fn read_solution(path: impl AsRef<Path>) -> Result<Vec<u32>, Error> {
    parse_solution(BufReader::new(File::open(path)?))
}

pub fn parse_solution<R: BufRead>(reader: R) -> Result<Vec<u32>, Error> {
    let mut solution = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let mut tokens = line.split_whitespace();
        let Some(node) = tokens.next() else {
            continue;
        };
        let _: u32 = parse_token(Some(node), "solution node")?;
        let distance: u32 = parse_token(tokens.next(), "solution distance")?;
        solution.push(distance);
    }
    Ok(solution)
}

fn parse_token<T: std::str::FromStr>(token: Option<&str>, what: &str) -> Result<T, Error> {
    token
        .ok_or_else(|| Error::Malformed(format!("missing {what}")))?
        .parse()
        .map_err(|_| Error::Malformed(format!("invalid {what}")))
}
