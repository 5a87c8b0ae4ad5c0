use netforge_core::{NetSpec, NodeSpec, Phase, NetState};
use serde_json::json;

// Helpers shared by the integration test crates.
// allow(dead_code) because each test crate only uses part of them.
#[allow(dead_code)]
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Two-layer regression network: x[batch, 2] -> ip1 -> ReLU (in place)
/// -> dropout -> ip2 -> EuclideanLoss against t[batch, 1].
#[allow(dead_code)]
pub fn regression_net(batch: usize, phase: Phase) -> NetSpec {
    NetSpec::new("regression")
        .input("x", &[batch, 2])
        .input("t", &[batch, 1])
        .node(
            NodeSpec::new("ip1", "InnerProduct")
                .input("x")
                .output("h")
                .set("num_output", 8)
                .set("weight_filler", json!({"type": "gaussian", "std": 0.5}))
                .set("bias_filler", json!({"type": "constant", "value": 0.1})),
        )
        .node(NodeSpec::new("relu", "ReLU").input("h").output("h"))
        .node(
            NodeSpec::new("drop", "Dropout")
                .input("h")
                .output("d")
                .set("dropout_ratio", 0.2),
        )
        .node(
            NodeSpec::new("ip2", "InnerProduct")
                .input("d")
                .output("y")
                .set("num_output", 1)
                .set("weight_filler", json!({"type": "gaussian", "std": 0.5})),
        )
        .node(NodeSpec::new("loss", "EuclideanLoss").input("y").input("t").output("loss"))
        .with_state(NetState::new(phase))
        .with_seed(1701)
}

/// Inputs and targets for `y = x0 - 2 * x1`.
#[allow(dead_code)]
pub fn regression_data(batch: usize) -> (Vec<f64>, Vec<f64>) {
    let mut x = Vec::with_capacity(batch * 2);
    let mut t = Vec::with_capacity(batch);
    for i in 0..batch {
        let a = (i as f64 * 0.37).sin();
        let b = (i as f64 * 0.11).cos();
        x.push(a);
        x.push(b);
        t.push(a - 2.0 * b);
    }
    (x, t)
}
