//! Learns XOR with a 2 → 4 (Tanh) → 1 (Sigmoid) network and mean squared
//! error, driving the graph, backward pass and optimizer by hand.
//!
//! Run with:
//!   cargo run --example xor

use ferrite_grad::{
    mse_loss, ActivationFunction, Graph, Matrix, Model, ModelSpec, Optimizer, Result, Sgd,
};
use ferrite_grad::network::LayerSpec;

fn main() -> Result<()> {
    let spec = ModelSpec {
        name: "xor".into(),
        layers: vec![
            LayerSpec::Linear { in_features: 2, out_features: 4, bias: true },
            LayerSpec::Activation { function: ActivationFunction::Tanh },
            LayerSpec::Linear { in_features: 4, out_features: 1, bias: true },
            LayerSpec::Activation { function: ActivationFunction::Sigmoid },
        ],
    };
    let mut model = Model::from_spec(&spec, 42)?;

    let inputs = Matrix::from_rows(vec![
        vec![1.0, 0.0],
        vec![1.0, 1.0],
        vec![0.0, 1.0],
        vec![0.0, 0.0],
    ])?;
    let expected = Matrix::from_rows(vec![vec![1.0], vec![0.0], vec![1.0], vec![0.0]])?;

    let mut optimizer = Sgd::with_momentum(model.parameters(), 0.5, 0.9);
    let epochs = 2000;

    for epoch in 0..epochs {
        optimizer.zero_grad(model.params_mut())?;
        let mut graph = Graph::new();
        let x = graph.input(inputs.clone());
        let y = graph.input(expected.clone());
        let out = model.forward(&mut graph, x)?;
        let loss = mse_loss(&mut graph, out, y)?;
        graph.backward(loss, model.params_mut())?;
        optimizer.step(model.params_mut())?;

        if epoch % 200 == 0 {
            println!("Epoch {epoch}: loss = {:.6}", graph.value(loss)?.item());
        }
    }

    let outputs = model.infer(&inputs)?;
    for r in 0..inputs.rows {
        println!("Input: {:?} -> Output: {:.4}", inputs.row(r), outputs.get(r, 0));
    }
    Ok(())
}
