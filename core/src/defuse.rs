use crate::internal::*;

#[derive(Clone, Debug, PartialEq)]
pub enum DefuseOutcome {
    /// The activation now lives in its own node `fused`.
    Split { node: NodeId, fused: NodeId },
    Unchanged { node: NodeId },
    /// The activation has no standalone lowering and stays embedded.
    Skipped { node: NodeId, reason: String },
}

/// Split fused ReLU and ReLU6 activations out of their operators.
///
/// Each split node N gets a successor `<N>_Fused` that takes over N's
/// consumers and, if N was one, its place among the graph outputs.
pub fn defuse(graph: &mut Graph, operators: &[OperatorRecord]) -> Result<Vec<DefuseOutcome>> {
    let candidates = graph
        .order
        .iter()
        .copied()
        .filter(|&id| matches!(graph.node(id).kind, NodeKind::Operator { .. }))
        .collect_vec();
    let mut outcomes = vec![];
    for id in candidates {
        let activation = graph.record(id, operators)?.op.fused_activation();
        let outcome = match activation {
            _ if graph.node(id).activation_extracted => DefuseOutcome::Unchanged { node: id },
            None | Some(FusedActivation::None) => DefuseOutcome::Unchanged { node: id },
            Some(act @ (FusedActivation::Relu | FusedActivation::Relu6)) => split(graph, id, act)?,
            Some(other) => {
                let reason = format!("fused activation {other:?} has no standalone lowering");
                warn!("Keeping activation of {}: {reason}", graph.node(id));
                DefuseOutcome::Skipped { node: id, reason }
            }
        };
        outcomes.push(outcome);
    }
    info!(
        "De-fused {} activations",
        outcomes.iter().filter(|o| matches!(o, DefuseOutcome::Split { .. })).count()
    );
    Ok(outcomes)
}

fn split(graph: &mut Graph, id: NodeId, activation: FusedActivation) -> Result<DefuseOutcome> {
    let consumers = graph.node(id).outputs.clone();
    let fused_node = GraphNode {
        id: 0,
        name: format!("{}_Fused", graph.node(id).name),
        tensor: None,
        kind: NodeKind::Defused { origin: id, activation },
        inputs: tvec!(id),
        outputs: consumers.clone(),
        activation_extracted: false,
    };
    let fused = graph.insert_after(id, fused_node)?;
    for consumer in consumers {
        let inputs = &mut graph.node_mut(consumer).inputs;
        ensure!(
            inputs.contains(&id),
            "Inconsistent edges: node #{consumer} is a consumer of #{id} but does not list it as input"
        );
        for input in inputs.iter_mut().filter(|i| **i == id) {
            *input = fused;
        }
    }
    for output in graph.outputs.iter_mut().filter(|o| **o == id) {
        *output = fused;
    }
    let node = graph.node_mut(id);
    node.outputs = tvec!(fused);
    node.activation_extracted = true;
    debug!("Split {activation:?} out of {} into {}", graph.node(id), graph.node(fused));
    Ok(DefuseOutcome::Split { node: id, fused })
}
