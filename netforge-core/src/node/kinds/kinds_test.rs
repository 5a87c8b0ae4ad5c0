#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use serde_json::json;

    use crate::buffer::Buffer;
    use crate::error::NetForgeError;
    use crate::node::NodeHarness;
    use crate::spec::NodeSpec;
    use crate::types::Phase;

    #[test]
    fn test_split_sums_output_gradients() -> Result<(), NetForgeError> {
        let spec = NodeSpec::new("split", "Split").input("x").output("a").output("b");
        let x = Buffer::from_vec(vec![1.0f32, 2.0, 3.0], &[3])?;
        let mut h = NodeHarness::new(&spec, vec![x])?;
        h.forward()?;
        let (x, a, b) = (h.inputs()[0], h.outputs()[0], h.outputs()[1]);
        assert_eq!(h.arena().value(b), &[1.0, 2.0, 3.0]);

        h.arena_mut().fill_grad(a, 1.0);
        h.arena_mut().fill_grad(b, 2.5);
        h.backward(&[true])?;
        assert_eq!(h.arena().grad(x), &[3.5, 3.5, 3.5]);
        Ok(())
    }

    #[test]
    fn test_scale_forward_backward() -> Result<(), NetForgeError> {
        let spec = NodeSpec::new("s", "Scale").input("x").output("y").set("scale", 2.0).set("bias", -1.0);
        let x = Buffer::from_vec(vec![0.5f64, 3.0], &[2])?;
        let mut h = NodeHarness::new(&spec, vec![x])?;
        h.forward()?;
        assert_eq!(h.arena().value(h.outputs()[0]), &[0.0, 5.0]);
        let y = h.outputs()[0];
        h.arena_mut().fill_grad(y, 1.0);
        h.backward(&[true])?;
        assert_eq!(h.arena().grad(h.inputs()[0]), &[2.0, 2.0]);
        Ok(())
    }

    #[test]
    fn test_relu_negative_slope() -> Result<(), NetForgeError> {
        let spec = NodeSpec::new("r", "ReLU").input("x").output("y").set("negative_slope", 0.1);
        let x = Buffer::from_vec(vec![-2.0f64, 4.0], &[2])?;
        let mut h = NodeHarness::new(&spec, vec![x])?;
        h.forward()?;
        let y = h.outputs()[0];
        assert_relative_eq!(h.arena().value(y)[0], -0.2);
        assert_relative_eq!(h.arena().value(y)[1], 4.0);
        h.arena_mut().fill_grad(y, 1.0);
        h.backward(&[true])?;
        assert_relative_eq!(h.arena().grad(h.inputs()[0])[0], 0.1);
        assert_relative_eq!(h.arena().grad(h.inputs()[0])[1], 1.0);
        Ok(())
    }

    #[test]
    fn test_square_in_place_backward_uses_saved_input() -> Result<(), NetForgeError> {
        let spec = NodeSpec::new("sq", "Square").input("x").output("x");
        let x = Buffer::from_vec(vec![3.0f64, -1.0], &[2])?;
        let mut h = NodeHarness::new(&spec, vec![x])?;
        h.forward()?;
        let x = h.inputs()[0];
        assert_eq!(h.arena().value(x), &[9.0, 1.0]);
        h.arena_mut().fill_grad(x, 1.0);
        h.backward(&[true])?;
        assert_eq!(h.arena().grad(x), &[6.0, -2.0]);
        Ok(())
    }

    #[test]
    fn test_inner_product_forward_and_param_grads() -> Result<(), NetForgeError> {
        let spec = NodeSpec::new("ip", "InnerProduct")
            .input("x")
            .output("y")
            .set("num_output", 2)
            .set("weight_filler", json!({"type": "constant", "value": 1.0}))
            .set("bias_filler", json!({"type": "constant", "value": 0.5}));
        let x = Buffer::from_vec(vec![1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3])?;
        let mut h = NodeHarness::new(&spec, vec![x])?;
        assert_eq!(h.params().len(), 2);
        assert_eq!(h.arena().shape(h.params()[0]), &[2, 3]);

        h.forward()?;
        let y = h.outputs()[0];
        assert_eq!(h.arena().shape(y), &[2, 2]);
        assert_eq!(h.arena().value(y), &[6.5, 6.5, 15.5, 15.5]);

        h.arena_mut().fill_grad(y, 1.0);
        h.backward(&[true])?;
        // Parameter gradients accumulate across calls.
        h.backward(&[true])?;
        assert_eq!(h.arena().grad(h.params()[1]), &[4.0, 4.0]);
        assert_eq!(h.arena().grad(h.params()[0]), &[10.0, 14.0, 18.0, 10.0, 14.0, 18.0]);
        assert_eq!(h.arena().grad(h.inputs()[0]), &[2.0; 6]);
        Ok(())
    }

    #[test]
    fn test_inner_product_requires_num_output() {
        let spec = NodeSpec::new("ip", "InnerProduct").input("x").output("y");
        let result = NodeHarness::<f32>::new(&spec, vec![Buffer::new(&[1, 2])]);
        assert!(matches!(result, Err(NetForgeError::InvalidConfig { .. })));
    }

    #[test]
    fn test_flatten_aliases_value_and_grad() -> Result<(), NetForgeError> {
        let spec = NodeSpec::new("flat", "Flatten").input("x").output("y");
        let x = Buffer::from_vec((0..12).map(|v| v as f32).collect(), &[2, 3, 2])?;
        let mut h = NodeHarness::new(&spec, vec![x])?;
        h.forward()?;
        let (x, y) = (h.inputs()[0], h.outputs()[0]);
        assert_eq!(h.arena().shape(y), &[2, 6]);
        assert_eq!(h.arena().value_owner(y), x);
        assert_eq!(h.arena().grad_owner(y), x);
        h.arena_mut().grad_mut(y)[4] = 7.0;
        assert_eq!(h.arena().grad(x)[4], 7.0);
        Ok(())
    }

    #[test]
    fn test_slice_with_points() -> Result<(), NetForgeError> {
        let spec = NodeSpec::new("slice", "Slice")
            .input("x")
            .output("a")
            .output("b")
            .set("axis", 1)
            .set("slice_points", vec![1]);
        let x = Buffer::from_vec(vec![1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3])?;
        let mut h = NodeHarness::new(&spec, vec![x])?;
        h.forward()?;
        let (a, b) = (h.outputs()[0], h.outputs()[1]);
        assert_eq!(h.arena().shape(a), &[2, 1]);
        assert_eq!(h.arena().value(a), &[1.0, 4.0]);
        assert_eq!(h.arena().value(b), &[2.0, 3.0, 5.0, 6.0]);

        h.arena_mut().fill_grad(a, 1.0);
        h.arena_mut().fill_grad(b, 2.0);
        h.backward(&[true])?;
        assert_eq!(h.arena().grad(h.inputs()[0]), &[1.0, 2.0, 2.0, 1.0, 2.0, 2.0]);
        Ok(())
    }

    #[test]
    fn test_slice_rejects_uneven_split() {
        let spec = NodeSpec::new("slice", "Slice").input("x").output("a").output("b");
        let result = NodeHarness::<f32>::new(&spec, vec![Buffer::new(&[1, 3])]);
        assert!(matches!(result, Err(NetForgeError::InvalidConfig { .. })));
    }

    #[test]
    fn test_dropout_train_and_test_phase() -> Result<(), NetForgeError> {
        let train = NodeSpec::new("drop", "Dropout")
            .input("x")
            .output("y")
            .set("dropout_ratio", 0.5)
            .with_phase(Phase::Train);
        let x = Buffer::from_vec(vec![1.0f64; 100], &[100])?;
        let mut h = NodeHarness::new(&train, vec![x.clone()])?;
        h.forward()?;
        let y = h.arena().value(h.outputs()[0]);
        assert!(y.iter().all(|&v| v == 0.0 || v == 2.0));
        assert!(y.iter().any(|&v| v == 0.0));
        assert!(y.iter().any(|&v| v == 2.0));

        let test = train.clone().with_phase(Phase::Test);
        let mut h = NodeHarness::new(&test, vec![x])?;
        h.forward()?;
        assert_eq!(h.arena().value(h.outputs()[0]), &[1.0; 100][..]);
        Ok(())
    }

    #[test]
    fn test_euclidean_loss_value() -> Result<(), NetForgeError> {
        let spec = NodeSpec::new("loss", "EuclideanLoss").input("a").input("b");
        let a = Buffer::from_vec(vec![1.0f64, 2.0, 3.0, 4.0], &[2, 2])?;
        let b = Buffer::from_vec(vec![0.0f64, 2.0, 1.0, 4.0], &[2, 2])?;
        let mut h = NodeHarness::new(&spec, vec![a, b])?;
        assert_eq!(h.node().default_loss_weight(0), 1.0);
        h.forward()?;
        // (1 + 4) / 2 / 2
        assert_relative_eq!(h.arena().value(h.outputs()[0])[0], 1.25);
        Ok(())
    }

    #[test]
    fn test_multinomial_logistic_loss() -> Result<(), NetForgeError> {
        let spec = NodeSpec::new("nll", "MultinomialLogisticLoss").input("prob").input("label");
        let prob = Buffer::from_vec(vec![0.25f64, 0.75, 0.5, 0.5], &[2, 2])?;
        let label = Buffer::from_vec(vec![1.0f64, 0.0], &[2])?;
        let mut h = NodeHarness::new(&spec, vec![prob, label])?;
        assert!(!h.node().allow_force_backward(1));
        h.forward()?;
        let expected = -(0.75f64.ln() + 0.5f64.ln()) / 2.0;
        assert_relative_eq!(h.arena().value(h.outputs()[0])[0], expected);

        let out = h.outputs()[0];
        h.arena_mut().fill_grad(out, 1.0);
        h.backward(&[true, false])?;
        let dx = h.arena().grad(h.inputs()[0]);
        assert_relative_eq!(dx[1], -0.5 / 0.75);
        assert_relative_eq!(dx[2], -0.5 / 0.5);
        assert_eq!(dx[0], 0.0);

        assert!(matches!(
            h.backward(&[true, true]),
            Err(NetForgeError::UnsupportedOperation(_))
        ));
        Ok(())
    }
}
