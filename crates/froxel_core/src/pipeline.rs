//! Frame pass graph.
//!
//! Passes declare the resources they read and write and the passes they run
//! after. `compile` turns the declarations into an execution order and
//! refuses any graph where two passes touch the same resource, at least one
//! of them writing it, without a declared dependency path between them.
//! Submission order alone never counts as ordering.

use std::collections::VecDeque;

use thiserror::Error;

/// Named GPU/host resource shared between passes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ResourceId(pub &'static str);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PassId(usize);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PassGraphError {
    #[error("pass `{0}` declared twice")]
    DuplicatePass(&'static str),
    #[error("pass `{pass}` depends on an unknown pass")]
    UnknownDependency { pass: &'static str },
    #[error("dependency cycle through pass `{0}`")]
    Cycle(&'static str),
    #[error("resource `{resource}` written by both `{first}` and `{second}`")]
    MultipleWriters {
        resource: &'static str,
        first: &'static str,
        second: &'static str,
    },
    #[error("`{reader}` and `{writer}` both access `{resource}` with no declared ordering")]
    UnorderedAccess {
        resource: &'static str,
        writer: &'static str,
        reader: &'static str,
    },
    #[error("`{reader}` reads `{resource}` before its writer `{writer}` runs")]
    ReadBeforeWrite {
        resource: &'static str,
        writer: &'static str,
        reader: &'static str,
    },
}

pub struct PassNode<T> {
    name: &'static str,
    payload: T,
    reads: Vec<ResourceId>,
    writes: Vec<ResourceId>,
    after: Vec<PassId>,
}

impl<T> PassNode<T> {
    pub fn new(name: &'static str, payload: T) -> Self {
        Self {
            name,
            payload,
            reads: Vec::new(),
            writes: Vec::new(),
            after: Vec::new(),
        }
    }

    pub fn reads(mut self, resource: ResourceId) -> Self {
        self.reads.push(resource);
        self
    }

    pub fn writes(mut self, resource: ResourceId) -> Self {
        self.writes.push(resource);
        self
    }

    pub fn after(mut self, pass: PassId) -> Self {
        self.after.push(pass);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    fn touches(&self, resource: ResourceId) -> bool {
        self.reads.contains(&resource) || self.writes.contains(&resource)
    }
}

pub struct PassGraph<T> {
    nodes: Vec<PassNode<T>>,
}

impl<T> Default for PassGraph<T> {
    fn default() -> Self {
        Self { nodes: Vec::new() }
    }
}

impl<T> PassGraph<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pass(&mut self, node: PassNode<T>) -> PassId {
        self.nodes.push(node);
        PassId(self.nodes.len() - 1)
    }

    /// Validates the declarations and produces the execution order.
    /// Among passes with no mutual dependency, insertion order wins.
    pub fn compile(self) -> Result<Schedule<T>, PassGraphError> {
        let count = self.nodes.len();

        for (i, node) in self.nodes.iter().enumerate() {
            if self.nodes[..i].iter().any(|other| other.name == node.name) {
                return Err(PassGraphError::DuplicatePass(node.name));
            }
            if node.after.iter().any(|dep| dep.0 >= count || dep.0 == i) {
                return Err(PassGraphError::UnknownDependency { pass: node.name });
            }
        }

        let order = self.topological_order()?;
        let reach = self.reachability();
        self.check_hazards(&reach)?;

        let mut slots: Vec<Option<PassNode<T>>> = self.nodes.into_iter().map(Some).collect();
        let passes = order
            .into_iter()
            .filter_map(|index| slots[index].take())
            .collect();

        Ok(Schedule { passes })
    }

    fn topological_order(&self) -> Result<Vec<usize>, PassGraphError> {
        let count = self.nodes.len();
        let mut indegree = vec![0usize; count];
        let mut dependents = vec![Vec::new(); count];
        for (i, node) in self.nodes.iter().enumerate() {
            for dep in &node.after {
                indegree[i] += 1;
                dependents[dep.0].push(i);
            }
        }

        let mut ready: VecDeque<usize> = (0..count).filter(|&i| indegree[i] == 0).collect();
        let mut order = Vec::with_capacity(count);
        while let Some(index) = ready.pop_front() {
            order.push(index);
            for &next in &dependents[index] {
                indegree[next] -= 1;
                if indegree[next] == 0 {
                    // Keep the ready queue sorted so ties resolve by insertion order.
                    let at = ready.partition_point(|&queued| queued < next);
                    ready.insert(at, next);
                }
            }
        }

        if order.len() != count {
            let stuck = (0..count).find(|&i| indegree[i] > 0).unwrap_or(0);
            return Err(PassGraphError::Cycle(self.nodes[stuck].name));
        }
        Ok(order)
    }

    /// `reach[a][b]` is true when `b` transitively runs after `a`.
    fn reachability(&self) -> Vec<Vec<bool>> {
        let count = self.nodes.len();
        let mut reach = vec![vec![false; count]; count];
        for (i, node) in self.nodes.iter().enumerate() {
            for dep in &node.after {
                reach[dep.0][i] = true;
            }
        }
        for k in 0..count {
            for a in 0..count {
                if reach[a][k] {
                    for b in 0..count {
                        if reach[k][b] {
                            reach[a][b] = true;
                        }
                    }
                }
            }
        }
        reach
    }

    fn check_hazards(&self, reach: &[Vec<bool>]) -> Result<(), PassGraphError> {
        for (w, writer) in self.nodes.iter().enumerate() {
            for &resource in &writer.writes {
                for (o, other) in self.nodes.iter().enumerate() {
                    if o == w || !other.touches(resource) {
                        continue;
                    }
                    if other.writes.contains(&resource) {
                        return Err(PassGraphError::MultipleWriters {
                            resource: resource.0,
                            first: writer.name.min(other.name),
                            second: writer.name.max(other.name),
                        });
                    }
                    if reach[o][w] {
                        return Err(PassGraphError::ReadBeforeWrite {
                            resource: resource.0,
                            writer: writer.name,
                            reader: other.name,
                        });
                    }
                    if !reach[w][o] {
                        return Err(PassGraphError::UnorderedAccess {
                            resource: resource.0,
                            writer: writer.name,
                            reader: other.name,
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// Runs one pass of a compiled schedule.
pub trait PassExecutor<T> {
    type Error;

    fn execute(&mut self, pass: &PassNode<T>) -> Result<(), Self::Error>;
}

/// Validated, totally ordered list of passes.
pub struct Schedule<T> {
    passes: Vec<PassNode<T>>,
}

impl<T> Schedule<T> {
    pub fn passes(&self) -> impl Iterator<Item = &PassNode<T>> {
        self.passes.iter()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|pass| pass.name).collect()
    }

    /// Executes every pass in order. The first failure abandons the rest of
    /// the frame.
    pub fn run<E: PassExecutor<T>>(&self, executor: &mut E) -> Result<(), E::Error> {
        for pass in &self.passes {
            log::trace!("executing pass `{}`", pass.name);
            executor.execute(pass)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIGHTS: ResourceId = ResourceId("lights");
    const CLUSTERS: ResourceId = ResourceId("clusters");
    const GBUFFER: ResourceId = ResourceId("gbuffer");

    #[test]
    fn orders_dependent_passes() {
        let mut graph = PassGraph::new();
        let motion = graph.add_pass(PassNode::new("motion", 0).writes(LIGHTS));
        let assign = graph.add_pass(
            PassNode::new("assign", 1)
                .reads(LIGHTS)
                .writes(CLUSTERS)
                .after(motion),
        );
        let geometry = graph.add_pass(PassNode::new("geometry", 2).writes(GBUFFER));
        graph.add_pass(
            PassNode::new("lighting", 3)
                .reads(LIGHTS)
                .reads(CLUSTERS)
                .reads(GBUFFER)
                .after(assign)
                .after(geometry),
        );

        let schedule = graph.compile().unwrap();
        assert_eq!(schedule.names(), vec!["motion", "assign", "geometry", "lighting"]);
    }

    #[test]
    fn insertion_order_breaks_ties() {
        let mut graph = PassGraph::new();
        let first = graph.add_pass(PassNode::new("b", ()));
        graph.add_pass(PassNode::new("c", ()).after(first));
        graph.add_pass(PassNode::new("a", ()));

        // "c" becomes ready after "b" and still precedes the later-inserted "a".
        let schedule = graph.compile().unwrap();
        assert_eq!(schedule.names(), vec!["b", "c", "a"]);
    }

    #[test]
    fn missing_dependency_is_detected() {
        let mut graph = PassGraph::new();
        graph.add_pass(PassNode::new("assign", ()).writes(CLUSTERS));
        graph.add_pass(PassNode::new("lighting", ()).reads(CLUSTERS));

        let err = graph.compile().err().unwrap();
        assert_eq!(
            err,
            PassGraphError::UnorderedAccess {
                resource: "clusters",
                writer: "assign",
                reader: "lighting",
            }
        );
    }

    #[test]
    fn reader_scheduled_before_writer_is_rejected() {
        let mut graph = PassGraph::new();
        let lighting = graph.add_pass(PassNode::new("lighting", ()).reads(CLUSTERS));
        graph.add_pass(PassNode::new("assign", ()).writes(CLUSTERS).after(lighting));

        assert!(matches!(
            graph.compile(),
            Err(PassGraphError::ReadBeforeWrite { .. })
        ));
    }

    #[test]
    fn two_writers_are_rejected() {
        let mut graph = PassGraph::new();
        let a = graph.add_pass(PassNode::new("a", ()).writes(LIGHTS));
        graph.add_pass(PassNode::new("b", ()).writes(LIGHTS).after(a));

        assert!(matches!(
            graph.compile(),
            Err(PassGraphError::MultipleWriters { .. })
        ));
    }

    #[test]
    fn cycles_are_rejected() {
        let mut graph: PassGraph<()> = PassGraph::new();
        // Forward reference to the pass added next.
        graph.add_pass(PassNode::new("a", ()).after(PassId(1)));
        graph.add_pass(PassNode::new("b", ()).after(PassId(0)));

        assert!(matches!(graph.compile(), Err(PassGraphError::Cycle(_))));
    }

    #[test]
    fn duplicate_and_unknown_passes_are_rejected() {
        let mut graph = PassGraph::new();
        graph.add_pass(PassNode::new("a", ()));
        graph.add_pass(PassNode::new("a", ()));
        assert_eq!(graph.compile().err(), Some(PassGraphError::DuplicatePass("a")));

        let mut graph = PassGraph::new();
        graph.add_pass(PassNode::new("a", ()).after(PassId(7)));
        assert!(matches!(
            graph.compile(),
            Err(PassGraphError::UnknownDependency { pass: "a" })
        ));
    }

    struct Recorder(Vec<&'static str>, Option<&'static str>);

    impl PassExecutor<u32> for Recorder {
        type Error = &'static str;

        fn execute(&mut self, pass: &PassNode<u32>) -> Result<(), Self::Error> {
            if self.1 == Some(pass.name()) {
                return Err(pass.name());
            }
            self.0.push(pass.name());
            Ok(())
        }
    }

    #[test]
    fn run_stops_at_first_failure() {
        let mut graph = PassGraph::new();
        let a = graph.add_pass(PassNode::new("a", 0u32));
        let b = graph.add_pass(PassNode::new("b", 1u32).after(a));
        graph.add_pass(PassNode::new("c", 2u32).after(b));
        let schedule = graph.compile().unwrap();

        let mut ok = Recorder(Vec::new(), None);
        schedule.run(&mut ok).unwrap();
        assert_eq!(ok.0, vec!["a", "b", "c"]);

        let mut failing = Recorder(Vec::new(), Some("b"));
        assert_eq!(schedule.run(&mut failing), Err("b"));
        assert_eq!(failing.0, vec!["a"]);
    }
}
