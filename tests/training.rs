use std::sync::atomic::AtomicBool;
use std::sync::{mpsc, Arc};

use ferrite_grad::train::{evaluate, synthetic_clusters, DataSource, InMemoryDataset};
use ferrite_grad::{
    nll_loss, train_loop, GradError, Graph, Matrix, Model, ModelSpec, Optimizer, Sgd, TrainConfig,
};

fn backward_on(model: &mut Model, inputs: &Matrix, targets: &[usize]) {
    let mut graph = Graph::new();
    let x = graph.input(inputs.clone());
    let out = model.forward(&mut graph, x).unwrap();
    let loss = nll_loss(&mut graph, out, targets).unwrap();
    graph.backward(loss, model.params_mut()).unwrap();
}

fn grads(model: &Model) -> Vec<Matrix> {
    model
        .parameters()
        .map(|id| model.params().get(id).unwrap().grad.clone().unwrap())
        .collect()
}

#[test]
fn test_zero_grad_prevents_leakage_between_steps() {
    let spec = ModelSpec::mlp("leak", &[4, 5, 3]);
    let mut model = Model::from_spec(&spec, 5).unwrap();
    let mut fresh = model.clone();

    let batch_a = Matrix::from_rows(vec![vec![1.0, 0.0, -1.0, 2.0], vec![0.3, 0.3, 0.3, 0.3]]).unwrap();
    let batch_b = Matrix::from_rows(vec![vec![-2.0, 1.0, 0.5, 0.0], vec![0.0, 1.0, 1.0, -1.0]]).unwrap();

    backward_on(&mut model, &batch_a, &[0, 2]);
    let sgd = Sgd::new(model.parameters(), 0.1);
    sgd.zero_grad(model.params_mut()).unwrap();
    backward_on(&mut model, &batch_b, &[1, 1]);

    backward_on(&mut fresh, &batch_b, &[1, 1]);
    assert_eq!(grads(&model), grads(&fresh));
}

#[test]
fn test_parameters_enumeration_is_stable() {
    let model = Model::from_spec(&ModelSpec::mlp("stable", &[8, 6, 4, 2]), 1).unwrap();
    let first: Vec<_> = model.parameters().collect();
    let second: Vec<_> = model.parameters().collect();
    assert_eq!(first.len(), 6);
    assert_eq!(first, second);
}

#[test]
fn test_two_steps_without_zero_grad_double_the_update() {
    let mut model = Model::from_spec(&ModelSpec::mlp("twice", &[3, 2]), 8).unwrap();
    let inputs = Matrix::from_rows(vec![vec![0.5, -0.5, 1.0]]).unwrap();
    backward_on(&mut model, &inputs, &[1]);

    let ids: Vec<_> = model.parameters().collect();
    let before: Vec<Matrix> = ids.iter().map(|&id| model.params().get(id).unwrap().value.clone()).collect();
    let lr = 0.05;
    let mut sgd = Sgd::new(ids.clone(), lr);
    sgd.step(model.params_mut()).unwrap();
    sgd.step(model.params_mut()).unwrap();

    for (i, &id) in ids.iter().enumerate() {
        let param = model.params().get(id).unwrap();
        let grad = param.grad.as_ref().unwrap();
        for j in 0..grad.len() {
            let single = lr * grad.data[j];
            let moved = before[i].data[j] - param.value.data[j];
            assert!((moved - 2.0 * single).abs() < 1e-12);
        }
    }
}

#[test]
fn test_two_batch_epoch_lowers_running_loss() {
    // 784 → 128 → 10, one epoch over two identical batches of 16.
    let (samples, labels) = synthetic_clusters(16, 10, 784, 0.2, 3);
    let mut all_samples = samples.clone();
    all_samples.extend(samples);
    let mut all_labels = labels.clone();
    all_labels.extend(labels);

    let mut data = InMemoryDataset::new(all_samples, all_labels, (28, 28), 16).unwrap();
    assert_eq!(data.num_batches(), 2);

    let mut model = Model::from_spec(&ModelSpec::mlp("digits", &[784, 128, 10]), 42).unwrap();
    let config = TrainConfig::new(1, 16, 0.01);
    let mut sgd = Sgd::new(model.parameters(), config.learning_rate);
    let report = train_loop(&mut model, &mut data, &mut sgd, &config).unwrap();

    assert_eq!(report.epochs_completed(), 1);
    let losses = &report.history[0].batch_losses;
    assert_eq!(losses.len(), 2);
    assert!(losses[1] < losses[0], "losses: {:?}", losses);
}

#[test]
fn test_training_separates_easy_clusters() {
    let (samples, labels) = synthetic_clusters(200, 3, 16, 0.1, 7);
    let mut train = InMemoryDataset::new(samples.clone(), labels.clone(), (1, 16), 20)
        .unwrap()
        .with_shuffle(7);
    let mut eval = InMemoryDataset::new(samples, labels, (1, 16), 50).unwrap();

    let mut model = Model::from_spec(&ModelSpec::mlp("clusters", &[16, 16, 3]), 7).unwrap();
    let before = evaluate(&model, &mut eval).unwrap();

    let config = TrainConfig::new(50, 20, 0.1);
    let mut sgd = Sgd::new(model.parameters(), config.learning_rate);
    let report = train_loop(&mut model, &mut train, &mut sgd, &config).unwrap();
    assert!(!report.stopped_early);

    let after = evaluate(&model, &mut eval).unwrap();
    assert_eq!(after.samples, 200);
    assert!(after.loss < before.loss);
    assert!(after.accuracy >= 0.9, "accuracy {}", after.accuracy);
}

#[test]
fn test_stop_flag_is_honoured_before_first_step() {
    let (samples, labels) = synthetic_clusters(10, 2, 4, 0.1, 0);
    let mut data = InMemoryDataset::new(samples, labels, (1, 4), 5).unwrap();
    let mut model = Model::from_spec(&ModelSpec::mlp("stop", &[4, 2]), 0).unwrap();
    let before = model.clone();

    let mut config = TrainConfig::new(3, 5, 0.1);
    config.stop_flag = Some(Arc::new(AtomicBool::new(true)));
    let mut sgd = Sgd::new(model.parameters(), config.learning_rate);
    let report = train_loop(&mut model, &mut data, &mut sgd, &config).unwrap();

    assert!(report.stopped_early);
    assert_eq!(report.epochs_completed(), 0);
    for id in model.parameters() {
        assert_eq!(model.params().get(id).unwrap().value, before.params().get(id).unwrap().value);
    }
}

#[test]
fn test_progress_channel_receives_each_epoch() {
    let (samples, labels) = synthetic_clusters(12, 3, 4, 0.1, 2);
    let mut data = InMemoryDataset::new(samples, labels, (1, 4), 4).unwrap();
    let mut model = Model::from_spec(&ModelSpec::mlp("progress", &[4, 3]), 2).unwrap();

    let (tx, rx) = mpsc::channel();
    let mut config = TrainConfig::new(3, 4, 0.05);
    config.progress_tx = Some(tx);
    let mut sgd = Sgd::new(model.parameters(), config.learning_rate);
    let report = train_loop(&mut model, &mut data, &mut sgd, &config).unwrap();
    drop(config);

    let received: Vec<_> = rx.iter().collect();
    assert_eq!(received.len(), 3);
    assert_eq!(received[2].epoch, 3);
    assert_eq!(received[0].batches, 3);
    assert_eq!(report.epochs_completed(), 3);
}

#[test]
fn test_dropped_receiver_stops_training() {
    let (samples, labels) = synthetic_clusters(8, 2, 4, 0.1, 4);
    let mut data = InMemoryDataset::new(samples, labels, (1, 4), 4).unwrap();
    let mut model = Model::from_spec(&ModelSpec::mlp("dropped", &[4, 2]), 4).unwrap();

    let (tx, rx) = mpsc::channel();
    drop(rx);
    let mut config = TrainConfig::new(5, 4, 0.05);
    config.progress_tx = Some(tx);
    let mut sgd = Sgd::new(model.parameters(), config.learning_rate);
    let report = train_loop(&mut model, &mut data, &mut sgd, &config).unwrap();

    assert!(report.stopped_early);
    assert_eq!(report.epochs_completed(), 1);
}

#[test]
fn test_step_errors_abort_the_run() {
    // label 5 does not exist for a 3-class model
    let mut data = InMemoryDataset::new(vec![vec![0.0; 4]; 2], vec![0, 5], (1, 4), 2).unwrap();
    let mut model = Model::from_spec(&ModelSpec::mlp("bad", &[4, 3]), 0).unwrap();
    let config = TrainConfig::new(2, 2, 0.1);
    let mut sgd = Sgd::new(model.parameters(), config.learning_rate);
    let result = train_loop(&mut model, &mut data, &mut sgd, &config);
    assert!(matches!(result, Err(GradError::ClassOutOfRange { index: 5, .. })));
}

#[test]
fn test_invalid_config_is_rejected_before_training() {
    let mut data = InMemoryDataset::new(vec![vec![0.0; 4]], vec![0], (1, 4), 1).unwrap();
    let mut model = Model::from_spec(&ModelSpec::mlp("cfg", &[4, 2]), 0).unwrap();
    let config = TrainConfig::new(1, 1, -0.1);
    let mut sgd = Sgd::new(model.parameters(), 0.1);
    assert!(matches!(
        train_loop(&mut model, &mut data, &mut sgd, &config),
        Err(GradError::InvalidConfig(_))
    ));
}

#[test]
fn test_saved_model_reloads_with_same_predictions() {
    let model = Model::from_spec(&ModelSpec::mlp("saved", &[6, 5, 3]), 21).unwrap();
    let inputs = Matrix::from_rows(vec![vec![0.1, 0.9, 0.3, 0.0, 0.5, 0.2], vec![1.0; 6]]).unwrap();

    let path = std::env::temp_dir().join(format!("ferrite-grad-{}.json", std::process::id()));
    let path = path.to_str().unwrap();
    model.save_json(path).unwrap();
    let loaded = Model::load_json(path).unwrap();
    std::fs::remove_file(path).unwrap();

    assert_eq!(loaded.name(), "saved");
    let expected = model.predict_proba(&inputs).unwrap();
    let actual = loaded.predict_proba(&inputs).unwrap();
    assert_eq!(actual.shape(), expected.shape());
    for (a, e) in actual.data.iter().zip(&expected.data) {
        assert!((a - e).abs() < 1e-12);
    }
    assert!(loaded.parameters().all(|id| loaded.params().get(id).unwrap().grad.is_none()));
}

fn reload_edited(tag: &str, edit: impl FnOnce(&mut serde_json::Value)) -> ferrite_grad::Result<Model> {
    let model = Model::from_spec(&ModelSpec::mlp("edited", &[2, 2]), 13).unwrap();
    let path = std::env::temp_dir().join(format!("ferrite-grad-{}-{}.json", tag, std::process::id()));
    let path = path.to_str().unwrap();
    model.save_json(path).unwrap();

    let mut json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    edit(&mut json);
    std::fs::write(path, serde_json::to_string(&json).unwrap()).unwrap();

    let loaded = Model::load_json(path);
    std::fs::remove_file(path).unwrap();
    loaded
}

#[test]
fn test_truncated_weight_buffer_is_rejected_on_load() {
    let loaded = reload_edited("short", |json| {
        json["params"]["params"][0]["value"]["data"] = serde_json::json!([0.5]);
    });
    assert!(matches!(loaded, Err(GradError::Json(_))));
}

#[test]
fn test_declared_widths_must_match_layers_on_load() {
    let loaded = reload_edited("width", |json| {
        json["input_features"] = serde_json::json!(7);
    });
    assert!(matches!(loaded, Err(GradError::InvalidConfig(_))));

    let loaded = reload_edited("outputs", |json| {
        json["output_features"] = serde_json::json!(5);
    });
    assert!(matches!(loaded, Err(GradError::InvalidConfig(_))));
}

#[test]
fn test_untouched_file_still_loads() {
    let loaded = reload_edited("same", |_| {}).unwrap();
    let probs = loaded.predict_proba(&Matrix::from_rows(vec![vec![0.2, 0.8]]).unwrap()).unwrap();
    assert!((probs.data.iter().sum::<f64>() - 1.0).abs() < 1e-9);
}

#[test]
fn test_evaluation_does_not_disturb_training_shuffle() {
    let (samples, labels) = synthetic_clusters(20, 2, 4, 0.3, 9);
    let make = || {
        InMemoryDataset::new(samples.clone(), labels.clone(), (1, 4), 6)
            .unwrap()
            .with_shuffle(11)
    };
    let model = Model::from_spec(&ModelSpec::mlp("eval", &[4, 2]), 9).unwrap();
    let mut plain = make();
    let mut evaluated = make();

    plain.start_epoch(1);
    evaluated.start_epoch(1);
    evaluate(&model, &mut evaluated).unwrap();

    plain.start_epoch(2);
    evaluated.start_epoch(2);
    while let Some(expected) = plain.next_batch().unwrap() {
        let actual = evaluated.next_batch().unwrap().unwrap();
        assert_eq!(actual.inputs, expected.inputs);
        assert_eq!(actual.targets, expected.targets);
    }
    assert!(evaluated.next_batch().unwrap().is_none());
}
