use log::trace;

use crate::activation::activation::ActivationFunction;
use crate::autograd::no_grad::NoGradGuard;
use crate::error::{GradError, Result};
use crate::math::matrix::Matrix;
use crate::network::parameter::{ParamId, ParamStore};

/// Handle to a node in a `Graph`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Var(usize);

impl Var {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Operation that produced a node, with handles to its inputs.
#[derive(Debug, Clone)]
enum Op {
    /// Input data, or any value computed while recording was off.
    Leaf,
    /// Copy of a parameter value; backward writes into the parameter.
    Param(ParamId),
    MatMul(Var, Var),
    Transpose(Var),
    Add(Var, Var),
    Sub(Var, Var),
    /// Matrix plus a `[1, cols]` row broadcast over every row.
    AddRowBroadcast(Var, Var),
    Mul(Var, Var),
    Scale(Var, f64),
    Activation(Var, ActivationFunction),
    Exp(Var),
    Ln(Var),
    Sum(Var),
    Mean(Var),
    Reshape(Var),
    LogSoftmax(Var),
    NllLoss(Var, Vec<usize>),
}

#[derive(Debug)]
struct Node {
    value: Matrix,
    grad: Option<Matrix>,
    op: Op,
}

/// Arena-backed computation graph for reverse-mode differentiation.
///
/// Nodes are appended as operations run, so every node's inputs sit at a
/// lower index than the node itself and arena order is a topological order.
/// A graph is meant to live for one forward/backward pass; parameters are
/// copied in with [`Graph::param`] and receive their gradients through the
/// `ParamStore` handed to [`Graph::backward`].
#[derive(Debug)]
pub struct Graph {
    nodes: Vec<Node>,
    recording: bool,
}

impl Default for Graph {
    fn default() -> Self {
        Graph::new()
    }
}

impl Graph {
    pub fn new() -> Graph {
        Graph { nodes: Vec::new(), recording: true }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Sets the recording flag and returns the previous one.
    pub(crate) fn set_recording(&mut self, recording: bool) -> bool {
        std::mem::replace(&mut self.recording, recording)
    }

    /// Suspends graph recording until the returned guard is dropped.
    ///
    /// The guard dereferences to the graph, so operations run through it
    /// produce untracked leaves. Guards nest; each restores the state that
    /// was active when it was created.
    pub fn no_grad(&mut self) -> NoGradGuard<'_> {
        NoGradGuard::new(self)
    }

    /// Runs `f` with recording suspended.
    pub fn with_no_grad<T>(&mut self, f: impl FnOnce(&mut Graph) -> T) -> T {
        let mut guard = self.no_grad();
        f(&mut *guard)
    }

    fn node(&self, var: Var) -> Result<&Node> {
        self.nodes.get(var.0).ok_or(GradError::UnknownNode(var.0))
    }

    pub fn value(&self, var: Var) -> Result<&Matrix> {
        Ok(&self.node(var)?.value)
    }

    /// Gradient accumulated into `var` by previous backward passes.
    pub fn grad(&self, var: Var) -> Option<&Matrix> {
        self.nodes.get(var.0).and_then(|n| n.grad.as_ref())
    }

    /// Whether `var` was produced by a recorded operation.
    pub fn is_tracked(&self, var: Var) -> bool {
        self.nodes
            .get(var.0)
            .map_or(false, |n| !matches!(n.op, Op::Leaf | Op::Param(_)))
    }

    fn push(&mut self, value: Matrix, op: Op) -> Var {
        let op = if self.recording { op } else { Op::Leaf };
        self.nodes.push(Node { value, grad: None, op });
        Var(self.nodes.len() - 1)
    }

    // ── Leaves ──────────────────────────────────────────────────────────────

    pub fn input(&mut self, value: Matrix) -> Var {
        self.nodes.push(Node { value, grad: None, op: Op::Leaf });
        Var(self.nodes.len() - 1)
    }

    /// Brings a parameter into the graph.
    pub fn param(&mut self, params: &ParamStore, id: ParamId) -> Result<Var> {
        let value = params.get(id)?.value.clone();
        Ok(self.push(value, Op::Param(id)))
    }

    // ── Recorded operations ─────────────────────────────────────────────────

    pub fn matmul(&mut self, a: Var, b: Var) -> Result<Var> {
        let value = self.value(a)?.matmul(self.value(b)?)?;
        Ok(self.push(value, Op::MatMul(a, b)))
    }

    pub fn transpose(&mut self, a: Var) -> Result<Var> {
        let value = self.value(a)?.transpose();
        Ok(self.push(value, Op::Transpose(a)))
    }

    pub fn add(&mut self, a: Var, b: Var) -> Result<Var> {
        let value = self.value(a)?.zip_map(self.value(b)?, "add", |x, y| x + y)?;
        Ok(self.push(value, Op::Add(a, b)))
    }

    pub fn sub(&mut self, a: Var, b: Var) -> Result<Var> {
        let value = self.value(a)?.zip_map(self.value(b)?, "sub", |x, y| x - y)?;
        Ok(self.push(value, Op::Sub(a, b)))
    }

    /// `a + row`, where `row` is `[1, cols]` and is added to every row of `a`.
    pub fn add_row_broadcast(&mut self, a: Var, row: Var) -> Result<Var> {
        let value = self.value(a)?.add_row_broadcast(self.value(row)?)?;
        Ok(self.push(value, Op::AddRowBroadcast(a, row)))
    }

    /// Elementwise product.
    pub fn mul(&mut self, a: Var, b: Var) -> Result<Var> {
        let value = self.value(a)?.zip_map(self.value(b)?, "mul", |x, y| x * y)?;
        Ok(self.push(value, Op::Mul(a, b)))
    }

    pub fn scale(&mut self, a: Var, factor: f64) -> Result<Var> {
        let value = self.value(a)?.scale(factor);
        Ok(self.push(value, Op::Scale(a, factor)))
    }

    pub fn activation(&mut self, a: Var, function: ActivationFunction) -> Result<Var> {
        let value = self.value(a)?.map(|x| function.function(x));
        Ok(self.push(value, Op::Activation(a, function)))
    }

    pub fn relu(&mut self, a: Var) -> Result<Var> {
        self.activation(a, ActivationFunction::ReLU)
    }

    pub fn exp(&mut self, a: Var) -> Result<Var> {
        let value = self.value(a)?.map(f64::exp);
        Ok(self.push(value, Op::Exp(a)))
    }

    pub fn ln(&mut self, a: Var) -> Result<Var> {
        let value = self.value(a)?.map(f64::ln);
        Ok(self.push(value, Op::Ln(a)))
    }

    pub fn sum(&mut self, a: Var) -> Result<Var> {
        let value = Matrix::scalar(self.value(a)?.sum());
        Ok(self.push(value, Op::Sum(a)))
    }

    pub fn mean(&mut self, a: Var) -> Result<Var> {
        let value = Matrix::scalar(self.value(a)?.mean());
        Ok(self.push(value, Op::Mean(a)))
    }

    pub fn reshape(&mut self, a: Var, rows: usize, cols: usize) -> Result<Var> {
        let value = self.value(a)?.reshape(rows, cols)?;
        Ok(self.push(value, Op::Reshape(a)))
    }

    /// Row-wise log-probabilities computed straight from raw scores:
    /// `x - max - ln(sum(exp(x - max)))`. Probabilities are never formed and
    /// re-logged, so rows whose probabilities underflow stay finite.
    pub fn log_softmax(&mut self, a: Var) -> Result<Var> {
        let x = self.value(a)?;
        let mut out = x.clone();
        if x.cols > 0 {
            for chunk in out.data.chunks_exact_mut(x.cols) {
                let max = chunk.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let sum_exp: f64 = chunk.iter().map(|&v| (v - max).exp()).sum();
                let lse = max + sum_exp.ln();
                chunk.iter_mut().for_each(|v| *v -= lse);
            }
        }
        Ok(self.push(out, Op::LogSoftmax(a)))
    }

    /// Mean negative log-likelihood of `targets` under row-wise
    /// log-probabilities.
    pub fn nll_loss(&mut self, log_probs: Var, targets: &[usize]) -> Result<Var> {
        let lp = self.value(log_probs)?;
        if lp.rows != targets.len() {
            return Err(GradError::BatchMismatch {
                predictions: lp.rows,
                targets: targets.len(),
            });
        }
        if targets.is_empty() {
            return Err(GradError::InvalidData("empty batch".to_owned()));
        }
        let mut total = 0.0;
        for (row, &class) in targets.iter().enumerate() {
            if class >= lp.cols {
                return Err(GradError::ClassOutOfRange { row, index: class, classes: lp.cols });
            }
            total -= lp.get(row, class);
        }
        let value = Matrix::scalar(total / targets.len() as f64);
        Ok(self.push(value, Op::NllLoss(log_probs, targets.to_vec())))
    }

    // ── Backward ────────────────────────────────────────────────────────────

    /// Reverse-mode sweep from the scalar `root`.
    ///
    /// Gradients are summed over every path to a node and then added into
    /// that node's gradient buffer and, for parameter nodes, into the
    /// owning parameter's buffer. Nothing is reset first, so calling this
    /// again accumulates.
    pub fn backward(&mut self, root: Var, params: &mut ParamStore) -> Result<()> {
        let root_node = self.node(root)?;
        if !root_node.value.is_scalar() {
            return Err(GradError::NotScalar(root_node.value.shape()));
        }
        if matches!(root_node.op, Op::Leaf | Op::Param(_)) {
            return Err(GradError::NoGraph(root.0));
        }

        let mut adjoints: Vec<Option<Matrix>> = vec![None; root.0 + 1];
        adjoints[root.0] = Some(Matrix::scalar(1.0));

        for i in (0..=root.0).rev() {
            let Some(upstream) = adjoints[i].take() else {
                continue;
            };

            for (input, grad) in self.local_grads(i, &upstream)? {
                match adjoints[input.0].as_mut() {
                    Some(acc) => acc.add_assign(&grad)?,
                    None => adjoints[input.0] = Some(grad),
                }
            }

            let node = &mut self.nodes[i];
            if let Op::Param(id) = node.op {
                params.get_mut(id)?.accumulate_grad(&upstream)?;
            }
            match node.grad.as_mut() {
                Some(grad) => grad.add_assign(&upstream)?,
                None => node.grad = Some(upstream),
            }
        }

        trace!("backward from node {} over {} nodes", root.0, root.0 + 1);
        Ok(())
    }

    /// Vector-Jacobian products of node `i` for an incoming gradient `g`.
    fn local_grads(&self, i: usize, g: &Matrix) -> Result<Vec<(Var, Matrix)>> {
        let node = &self.nodes[i];
        let grads = match &node.op {
            Op::Leaf | Op::Param(_) => Vec::new(),
            Op::MatMul(a, b) => {
                let (va, vb) = (self.value(*a)?, self.value(*b)?);
                vec![
                    (*a, g.matmul(&vb.transpose())?),
                    (*b, va.transpose().matmul(g)?),
                ]
            }
            Op::Transpose(a) => vec![(*a, g.transpose())],
            Op::Add(a, b) => vec![(*a, g.clone()), (*b, g.clone())],
            Op::Sub(a, b) => vec![(*a, g.clone()), (*b, g.scale(-1.0))],
            Op::AddRowBroadcast(a, row) => vec![(*a, g.clone()), (*row, g.sum_rows())],
            Op::Mul(a, b) => {
                let (va, vb) = (self.value(*a)?, self.value(*b)?);
                vec![
                    (*a, g.zip_map(vb, "mul", |x, y| x * y)?),
                    (*b, g.zip_map(va, "mul", |x, y| x * y)?),
                ]
            }
            Op::Scale(a, factor) => vec![(*a, g.scale(*factor))],
            Op::Activation(a, function) => {
                let va = self.value(*a)?;
                vec![(*a, g.zip_map(va, "activation", |gi, x| gi * function.derivative(x))?)]
            }
            Op::Exp(a) => vec![(*a, g.zip_map(&node.value, "exp", |gi, y| gi * y)?)],
            Op::Ln(a) => {
                let va = self.value(*a)?;
                vec![(*a, g.zip_map(va, "ln", |gi, x| gi / x)?)]
            }
            Op::Sum(a) => {
                let (rows, cols) = self.value(*a)?.shape();
                vec![(*a, Matrix::filled(rows, cols, g.item()))]
            }
            Op::Mean(a) => {
                let (rows, cols) = self.value(*a)?.shape();
                let n = (rows * cols).max(1) as f64;
                vec![(*a, Matrix::filled(rows, cols, g.item() / n))]
            }
            Op::Reshape(a) => {
                let (rows, cols) = self.value(*a)?.shape();
                vec![(*a, g.reshape(rows, cols)?)]
            }
            Op::LogSoftmax(a) => {
                // d/dx_j = g_j - softmax_j * sum_k g_k, with softmax = exp(output).
                let out = &node.value;
                let mut ga = g.clone();
                if out.cols > 0 {
                    for (ga_row, out_row) in ga
                        .data
                        .chunks_exact_mut(out.cols)
                        .zip(out.data.chunks_exact(out.cols))
                    {
                        let total: f64 = ga_row.iter().sum();
                        for (gj, &yj) in ga_row.iter_mut().zip(out_row) {
                            *gj -= yj.exp() * total;
                        }
                    }
                }
                vec![(*a, ga)]
            }
            Op::NllLoss(a, targets) => {
                let (rows, cols) = self.value(*a)?.shape();
                let mut ga = Matrix::zeros(rows, cols);
                let share = -g.item() / targets.len() as f64;
                for (row, &class) in targets.iter().enumerate() {
                    ga.set(row, class, share);
                }
                vec![(*a, ga)]
            }
        };
        Ok(grads)
    }
}
