use std::collections::HashMap;

use log::debug;

use super::{NetSpec, NodeSpec};

/// Kind tag of the fan-out node inserted by [`insert_splits`].
pub const SPLIT_KIND: &str = "Split";

/// Name of the split node fanning out output `index` of `producer`.
pub fn split_node_name(producer: &str, blob: &str, index: usize) -> String {
    format!("{}_{}_{}_split", producer, blob, index)
}

/// Name of the `k`-th output of the split node for `(producer, blob, index)`.
pub fn split_output_name(producer: &str, blob: &str, index: usize, k: usize) -> String {
    format!("{}_{}_{}_split_{}", producer, blob, index, k)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Source {
    Input,
    Node(usize),
}

/// `(producer, output index)`; graph inputs use their declaration index.
type Slot = (Source, usize);

/// Rewrites every buffer consumed more than once (counting a non-zero
/// explicit loss weight as a consumer) into a `Split` node whose outputs feed
/// the consumers one each, in specification order.
///
/// The split is placed right after its producer (graph-input splits come
/// first). When the fanned-out output carries a loss weight, the first split
/// output inherits it and the producer's weight for that output becomes 0.
/// An in-place consumer of a split buffer stays in place on its split output,
/// and later references to the in-place name follow that rename.
///
/// Names that resolve to no producer are left untouched; wiring reports them.
pub fn insert_splits(spec: &NetSpec) -> NetSpec {
    let mut last_producer: HashMap<&str, Slot> = HashMap::new();
    let mut source_of: HashMap<(usize, usize), Slot> = HashMap::new();
    let mut consumers: HashMap<Slot, usize> = HashMap::new();
    let mut loss_weight: HashMap<Slot, f64> = HashMap::new();

    for (i, input) in spec.inputs.iter().enumerate() {
        last_producer.insert(input.name.as_str(), (Source::Input, i));
    }
    for (i, node) in spec.nodes.iter().enumerate() {
        for (j, name) in node.inputs.iter().enumerate() {
            if let Some(&slot) = last_producer.get(name.as_str()) {
                source_of.insert((i, j), slot);
                *consumers.entry(slot).or_insert(0) += 1;
            }
        }
        for (j, name) in node.outputs.iter().enumerate() {
            last_producer.insert(name.as_str(), (Source::Node(i), j));
        }
        for (j, &weight) in node.loss_weights.iter().enumerate() {
            if weight != 0.0 {
                let slot = (Source::Node(i), j);
                loss_weight.insert(slot, weight);
                *consumers.entry(slot).or_insert(0) += 1;
            }
        }
    }

    let count = |slot: &Slot| consumers.get(slot).copied().unwrap_or(0);
    let mut result = spec.clone();
    result.nodes = Vec::with_capacity(spec.nodes.len());
    // Current name of every produced slot (differs from the declared one only
    // for in-place consumers of a split buffer).
    let mut slot_name: HashMap<Slot, String> = HashMap::new();
    let mut producer_name: HashMap<Slot, String> = HashMap::new();
    let mut next_split: HashMap<Slot, usize> = HashMap::new();

    for (i, input) in spec.inputs.iter().enumerate() {
        let slot = (Source::Input, i);
        slot_name.insert(slot, input.name.clone());
        producer_name.insert(slot, input.name.clone());
        let n = count(&slot);
        if n > 1 {
            result
                .nodes
                .push(split_spec(&input.name, &input.name, &input.name, i, n, 0.0));
        }
    }

    for (i, original) in spec.nodes.iter().enumerate() {
        let mut node = original.clone();
        for j in 0..node.inputs.len() {
            let Some(&slot) = source_of.get(&(i, j)) else {
                continue;
            };
            let current = slot_name
                .get(&slot)
                .cloned()
                .unwrap_or_else(|| original.inputs[j].clone());
            let rewired = if count(&slot) > 1 {
                let producer = producer_name.get(&slot).map(String::as_str).unwrap_or("");
                let k = next_split.entry(slot).or_insert(0);
                let name = split_output_name(producer, &original.inputs[j], slot.1, *k);
                *k += 1;
                name
            } else {
                current
            };
            if rewired != original.inputs[j] {
                // Keep an in-place output attached to its rewired input.
                for (out_idx, out_name) in original.outputs.iter().enumerate() {
                    if out_name == &original.inputs[j] {
                        node.outputs[out_idx] = rewired.clone();
                    }
                }
            }
            node.inputs[j] = rewired;
        }

        let mut splits = Vec::new();
        for (j, name) in original.outputs.iter().enumerate() {
            let slot = (Source::Node(i), j);
            slot_name.insert(slot, node.outputs[j].clone());
            producer_name.insert(slot, original.name.clone());
            let n = count(&slot);
            if n > 1 {
                let weight = loss_weight.get(&slot).copied().unwrap_or(0.0);
                splits.push(split_spec(&original.name, name, &node.outputs[j], j, n, weight));
                if weight != 0.0 {
                    node.loss_weights[j] = 0.0;
                    // Output 0 of the split is reserved for the loss.
                    next_split.insert(slot, 1);
                }
            }
        }
        result.nodes.push(node);
        result.nodes.extend(splits);
    }

    let inserted = result.nodes.len() - spec.nodes.len();
    if inserted > 0 {
        debug!("Inserted {} split node(s) into '{}'", inserted, spec.name);
    }
    result
}

fn split_spec(
    producer: &str,
    blob: &str,
    current: &str,
    index: usize,
    consumers: usize,
    loss_weight: f64,
) -> NodeSpec {
    let mut split = NodeSpec::new(&split_node_name(producer, blob, index), SPLIT_KIND).input(current);
    for k in 0..consumers {
        split = split.output(&split_output_name(producer, blob, index, k));
    }
    if loss_weight != 0.0 {
        split.loss_weights = (0..consumers)
            .map(|k| if k == 0 { loss_weight } else { 0.0 })
            .collect();
    }
    split
}
