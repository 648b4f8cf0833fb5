use std::ops::{Deref, DerefMut};

use crate::autograd::graph::Graph;

/// Scope in which a `Graph` records nothing.
///
/// Created by [`Graph::no_grad`]. Dropping the guard, on any exit path,
/// puts back the recording state that was active before it was created.
pub struct NoGradGuard<'g> {
    graph: &'g mut Graph,
    previous: bool,
}

impl<'g> NoGradGuard<'g> {
    pub(crate) fn new(graph: &'g mut Graph) -> NoGradGuard<'g> {
        let previous = graph.set_recording(false);
        NoGradGuard { graph, previous }
    }
}

impl Deref for NoGradGuard<'_> {
    type Target = Graph;

    fn deref(&self) -> &Graph {
        self.graph
    }
}

impl DerefMut for NoGradGuard<'_> {
    fn deref_mut(&mut self) -> &mut Graph {
        self.graph
    }
}

impl Drop for NoGradGuard<'_> {
    fn drop(&mut self) {
        self.graph.set_recording(self.previous);
    }
}
