#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::error::NetForgeError;
    use crate::graph::Graph;
    use crate::persist::{NetSnapshot, ParamTable};
    use crate::spec::{NetSpec, NodeSpec, ParamSpec};

    fn spec(seed: u64, num_output: usize) -> NetSpec {
        NetSpec::new("persisted")
            .input("x1", &[2, 3])
            .input("x2", &[2, 3])
            .node(
                NodeSpec::new("ip1", "InnerProduct")
                    .input("x1")
                    .output("y1")
                    .set("num_output", num_output)
                    .set("weight_filler", json!({"type": "gaussian", "std": 1.0}))
                    .set("bias_filler", json!({"type": "uniform", "min": -1.0, "max": 1.0}))
                    .param(ParamSpec::named("shared_w")),
            )
            .node(
                NodeSpec::new("ip2", "InnerProduct")
                    .input("x2")
                    .output("y2")
                    .set("num_output", num_output)
                    .set("weight_filler", json!({"type": "gaussian", "std": 1.0}))
                    .param(ParamSpec::named("shared_w")),
            )
            .with_seed(seed)
    }

    fn param_values(graph: &Graph<f32>) -> Vec<Vec<f32>> {
        graph
            .params()
            .iter()
            .map(|&id| graph.arena().value(id).to_vec())
            .collect()
    }

    #[test]
    fn test_snapshot_round_trip_is_bit_identical() -> Result<(), NetForgeError> {
        let source = Graph::<f32>::new(&spec(1, 2))?;
        let bytes = NetSnapshot::from_graph(&source).to_bytes()?;

        let mut target = Graph::<f32>::new(&spec(2, 2))?;
        assert_ne!(param_values(&source), param_values(&target));
        NetSnapshot::from_bytes(&bytes)?.apply_to(&mut target)?;
        assert_eq!(param_values(&source), param_values(&target));
        Ok(())
    }

    #[test]
    fn test_snapshot_records_every_node() -> Result<(), NetForgeError> {
        let graph = Graph::<f64>::new(&spec(1, 2))?;
        let snapshot = NetSnapshot::from_graph(&graph);
        assert_eq!(snapshot.name, "persisted");
        assert_eq!(snapshot.inputs, vec!["x1".to_string(), "x2".to_string()]);
        let names: Vec<&str> = snapshot.nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["ip1", "ip2"]);
        assert_eq!(snapshot.nodes[0].kind, "InnerProduct");
        assert_eq!(snapshot.nodes[0].params[0].shape, vec![2, 3]);
        // The shared weight is written under both nodes.
        assert_eq!(snapshot.nodes[0].params[0], snapshot.nodes[1].params[0]);
        Ok(())
    }

    #[test]
    fn test_snapshot_skips_unknown_nodes() -> Result<(), NetForgeError> {
        let source = Graph::<f32>::new(&spec(1, 2))?;
        let mut snapshot = NetSnapshot::from_graph(&source);
        snapshot.nodes[1].name = "renamed".to_string();
        let mut target = Graph::<f32>::new(&spec(2, 2))?;
        snapshot.apply_to(&mut target)?;
        assert_eq!(param_values(&source)[0], param_values(&target)[0]);
        Ok(())
    }

    #[test]
    fn test_snapshot_shape_mismatch_is_fatal() -> Result<(), NetForgeError> {
        let snapshot = NetSnapshot::from_graph(&Graph::<f32>::new(&spec(1, 2))?);
        let mut target = Graph::<f32>::new(&spec(1, 3))?;
        let result = snapshot.apply_to(&mut target);
        assert_eq!(
            result,
            Err(NetForgeError::SnapshotShapeMismatch {
                node: "ip1".to_string(),
                index: 0,
                source_shape: vec![2, 3],
                target_shape: vec![3, 3],
            })
        );
        Ok(())
    }

    #[test]
    fn test_snapshot_param_count_mismatch_is_fatal() -> Result<(), NetForgeError> {
        let mut snapshot = NetSnapshot::from_graph(&Graph::<f32>::new(&spec(1, 2))?);
        let extra = snapshot.nodes[0].params[0].clone();
        snapshot.nodes[0].params.push(extra);
        let mut target = Graph::<f32>::new(&spec(1, 2))?;
        assert!(matches!(
            snapshot.apply_to(&mut target),
            Err(NetForgeError::SnapshotParamCount { saved: 3, target: 2, .. })
        ));
        Ok(())
    }

    #[test]
    fn test_corrupt_snapshot_bytes() {
        assert!(matches!(
            NetSnapshot::from_bytes(&[1, 2, 3]),
            Err(NetForgeError::Serialization(_))
        ));
    }

    #[test]
    fn test_snapshot_file_round_trip() -> Result<(), NetForgeError> {
        let source = Graph::<f64>::new(&spec(3, 2))?;
        let path = std::env::temp_dir().join(format!("netforge_snapshot_{}.bin", std::process::id()));
        NetSnapshot::from_graph(&source).save(&path)?;
        let loaded = NetSnapshot::load(&path);
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded?, NetSnapshot::from_graph(&source));
        Ok(())
    }

    #[test]
    fn test_table_writes_owners_only() -> Result<(), NetForgeError> {
        let graph = Graph::<f32>::new(&spec(1, 2))?;
        let table = ParamTable::from_graph(&graph, false);
        assert_eq!(table.data["ip1"].len(), 2);
        // ip2's weight is shared; only its bias is owned.
        assert_eq!(table.data["ip2"].keys().copied().collect::<Vec<_>>(), vec![1]);
        assert!(table.diff.is_none());

        let with_diff = ParamTable::from_graph(&graph, true);
        assert_eq!(with_diff.diff.as_ref().map(|d| d["ip2"].len()), Some(2));
        Ok(())
    }

    #[test]
    fn test_table_json_round_trip() -> Result<(), NetForgeError> {
        let source = Graph::<f32>::new(&spec(1, 2))?;
        let text = ParamTable::from_graph(&source, true).to_json()?;

        let mut target = Graph::<f32>::new(&spec(2, 2))?;
        ParamTable::from_json(&text)?.apply_to(&mut target)?;
        assert_eq!(param_values(&source), param_values(&target));
        Ok(())
    }

    #[test]
    fn test_table_missing_owner_is_fatal() -> Result<(), NetForgeError> {
        let mut table = ParamTable::from_graph(&Graph::<f32>::new(&spec(1, 2))?, false);
        if let Some(ip1) = table.data.get_mut("ip1") {
            ip1.remove(&1);
        }
        let mut target = Graph::<f32>::new(&spec(1, 2))?;
        assert!(matches!(
            table.apply_to(&mut target),
            Err(NetForgeError::SnapshotParamCount { .. })
        ));
        Ok(())
    }
}
