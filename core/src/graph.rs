use std::collections::HashMap;
use std::fmt;

use crate::internal::*;

pub type NodeId = usize;

#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    /// Node built from the source operator at this index.
    Operator { record: usize },
    /// Activation split out of `origin` by the de-fusion pass.
    Defused { origin: NodeId, activation: FusedActivation },
}

#[derive(Clone, Debug, PartialEq)]
pub struct GraphNode {
    pub id: NodeId,
    pub name: String,
    /// Output tensor of the source operator, `None` for synthesized nodes.
    pub tensor: Option<usize>,
    pub kind: NodeKind,
    pub inputs: TVec<NodeId>,
    pub outputs: TVec<NodeId>,
    pub activation_extracted: bool,
}

impl fmt::Display for GraphNode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{} \"{}\"", self.id, self.name)
    }
}

/// Operator graph linked from tensor indices.
///
/// Nodes live in an arena and refer to each other by `NodeId`. `order` is the
/// lowering order: source operator order, with synthesized nodes right after
/// the node they were split from.
#[derive(Clone, Debug, Default)]
pub struct Graph {
    pub nodes: Vec<GraphNode>,
    pub order: Vec<NodeId>,
    pub outputs: Vec<NodeId>,
    by_name: HashMap<String, NodeId>,
    by_tensor: HashMap<usize, NodeId>,
}

/// Name a tensor goes by in the graph and in the emitted model.
pub fn tensor_name(catalog: &TensorCatalog, index: usize) -> Result<String> {
    let tensor = catalog.tensor(index)?;
    Ok(if tensor.name.is_empty() { format!("tensor_{index}") } else { tensor.name.clone() })
}

impl Graph {
    pub fn build(
        operators: &[OperatorRecord],
        catalog: &TensorCatalog,
        inputs: &[usize],
        outputs: &[usize],
    ) -> Result<Graph> {
        let mut graph = Graph::default();
        for (ix, record) in operators.iter().enumerate() {
            let tensor = record.output().with_context(|| format!("Operator #{ix}"))?;
            let name = tensor_name(catalog, tensor)?;
            ensure!(
                !graph.by_name.contains_key(&name),
                "Operator #{ix} ({}) produces {name:?}, a name already taken by another node",
                record.op
            );
            ensure!(
                !graph.by_tensor.contains_key(&tensor),
                "Tensor #{tensor} is produced by more than one operator"
            );
            let id = graph.nodes.len();
            graph.by_name.insert(name.clone(), id);
            graph.by_tensor.insert(tensor, id);
            graph.order.push(id);
            graph.nodes.push(GraphNode {
                id,
                name,
                tensor: Some(tensor),
                kind: NodeKind::Operator { record: ix },
                inputs: tvec!(),
                outputs: tvec!(),
                activation_extracted: false,
            });
        }

        for (ix, record) in operators.iter().enumerate() {
            let edges = graph.side_input_elimination(ix, record, catalog, inputs)?;
            graph.nodes[ix].inputs = edges;
        }

        for id in 0..graph.nodes.len() {
            for input in graph.nodes[id].inputs.clone() {
                let producer = &mut graph.nodes[input].outputs;
                if !producer.contains(&id) {
                    producer.push(id);
                }
            }
        }

        for &tensor in outputs {
            let id = graph.by_tensor.get(&tensor).with_context(|| {
                format!(
                    "Graph output {:?} is not produced by any operator",
                    catalog.tensor(tensor).map(|t| t.name.as_str()).unwrap_or("?")
                )
            })?;
            if !graph.outputs.contains(id) {
                graph.outputs.push(*id);
            }
        }
        debug!(
            "Built graph: {} nodes, {} outputs",
            graph.nodes.len(),
            graph.outputs.len()
        );
        Ok(graph)
    }

    /// Keep only the inputs produced by another node, matching them both by
    /// tensor index and by tensor name.
    fn side_input_elimination(
        &self,
        ix: usize,
        record: &OperatorRecord,
        catalog: &TensorCatalog,
        graph_inputs: &[usize],
    ) -> Result<TVec<NodeId>> {
        let by_index: TVec<NodeId> = record
            .inputs
            .iter()
            .filter(|&&t| t >= 0)
            .filter_map(|&t| self.by_tensor.get(&(t as usize)).copied())
            .collect();
        let by_name: TVec<NodeId> = record
            .inputs
            .iter()
            .filter(|&&t| t >= 0)
            .map(|&t| tensor_name(catalog, t as usize))
            .collect::<Result<TVec<_>>>()?
            .into_iter()
            .filter_map(|name| self.by_name.get(&name).copied())
            .collect();
        if by_index != by_name {
            bail!(
                "Malformed edge data on operator #{ix} ({}): inputs {:?} resolve to nodes {:?} by index but {:?} by name",
                record.op,
                record.inputs,
                by_index,
                by_name
            );
        }

        for &t in &record.inputs {
            if t < 0 {
                continue;
            }
            let t = t as usize;
            if let Some(&producer) = self.by_tensor.get(&t) {
                ensure!(
                    producer < ix,
                    "Operator #{ix} ({}) consumes {:?} before it is produced",
                    record.op,
                    self.nodes[producer].name
                );
            } else if !catalog.is_constant(t) && !graph_inputs.contains(&t) {
                bail!(
                    "Operator #{ix} ({}) consumes tensor #{t} {:?}, which is neither produced by an operator, constant nor a graph input",
                    record.op,
                    catalog.tensor(t)?.name
                );
            } else {
                trace!("Operator #{ix} ({}) side input tensor #{t}", record.op);
            }
        }
        Ok(by_index)
    }

    pub fn node(&self, id: NodeId) -> &GraphNode {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut GraphNode {
        &mut self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn by_name(&self, name: &str) -> Option<NodeId> {
        self.by_name.get(name).copied()
    }

    pub fn producer_of(&self, tensor: usize) -> Option<NodeId> {
        self.by_tensor.get(&tensor).copied()
    }

    /// Nodes in lowering order.
    pub fn iter(&self) -> impl Iterator<Item = &GraphNode> {
        self.order.iter().map(move |&id| &self.nodes[id])
    }

    /// The source tensor whose value this node computes.
    pub fn represented_tensor(&self, id: NodeId) -> Result<usize> {
        let node = &self.nodes[id];
        match (&node.kind, node.tensor) {
            (_, Some(t)) => Ok(t),
            (NodeKind::Defused { origin, .. }, None) => self.represented_tensor(*origin),
            _ => bail!("Node {node} has no tensor"),
        }
    }

    /// Source operator of the node, following de-fused nodes to their origin.
    pub fn record<'r>(&self, id: NodeId, operators: &'r [OperatorRecord]) -> Result<&'r OperatorRecord> {
        match self.nodes[id].kind {
            NodeKind::Operator { record } => operators
                .get(record)
                .with_context(|| format!("Node {} refers to missing operator #{record}", self.nodes[id])),
            NodeKind::Defused { origin, .. } => self.record(origin, operators),
        }
    }

    pub fn input_indices(&self, id: NodeId) -> Result<TVec<usize>> {
        self.nodes[id].inputs.iter().map(|&i| self.represented_tensor(i)).collect()
    }

    pub fn input_names(&self, id: NodeId) -> TVec<&str> {
        self.nodes[id].inputs.iter().map(|&i| self.nodes[i].name.as_str()).collect()
    }

    /// Add a synthesized node right after `after` in lowering order.
    pub fn insert_after(&mut self, after: NodeId, mut node: GraphNode) -> Result<NodeId> {
        ensure!(
            !self.by_name.contains_key(&node.name),
            "Can not add node {:?}, the name is taken",
            node.name
        );
        let position = self
            .order
            .iter()
            .position(|&id| id == after)
            .with_context(|| format!("Node #{after} is not in lowering order"))?;
        let id = self.nodes.len();
        node.id = id;
        self.by_name.insert(node.name.clone(), id);
        self.order.insert(position + 1, id);
        self.nodes.push(node);
        Ok(id)
    }

    pub fn is_output(&self, id: NodeId) -> bool {
        self.outputs.contains(&id)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;
    use proptest::sample::Index;

    fn add() -> Op {
        Op::Add { fused: FusedActivation::None }
    }

    fn chain() -> (TensorCatalog, Vec<OperatorRecord>) {
        let mut catalog = TensorCatalog::default();
        let x = catalog.add_activation("x", &[1, 4], DatumType::F32) as i32;
        let c = catalog.add_f32_constant("c", &[4], &[1.0; 4]) as i32;
        let a = catalog.add_activation("a", &[1, 4], DatumType::F32) as i32;
        let b = catalog.add_activation("b", &[1, 4], DatumType::F32) as i32;
        let ops = vec![
            OperatorRecord::new(add(), tvec!(x, c), tvec!(a)),
            OperatorRecord::new(add(), tvec!(a, a), tvec!(b)),
        ];
        (catalog, ops)
    }

    #[test]
    fn side_inputs_are_dropped() {
        let (catalog, ops) = chain();
        let graph = Graph::build(&ops, &catalog, &[0], &[3]).unwrap();
        assert_eq!(graph.len(), 2);
        assert!(graph.node(0).inputs.is_empty());
        assert_eq!(&*graph.node(1).inputs, &[0, 0]);
        assert_eq!(&*graph.node(0).outputs, &[1]);
        assert_eq!(graph.outputs, vec![1]);
        assert_eq!(&*graph.input_names(1), &["a", "a"]);
        assert_eq!(&*graph.input_indices(1).unwrap(), &[2, 2]);
    }

    #[test]
    fn zero_element_constant_is_a_side_input() {
        let mut catalog = TensorCatalog::default();
        let x = catalog.add_activation("x", &[1, 4], DatumType::F32) as i32;
        let axes = catalog.add_i32_constant("axes", &[0], &[]) as i32;
        let y = catalog.add_activation("y", &[1, 4], DatumType::F32) as i32;
        let ops = vec![OperatorRecord::new(Op::Mean { keep_dims: true }, tvec!(x, axes), tvec!(y))];
        let graph = Graph::build(&ops, &catalog, &[0], &[2]).unwrap();
        assert_eq!(graph.len(), 1);
        assert!(graph.node(0).inputs.is_empty());
    }

    #[test]
    fn dangling_input() {
        let (catalog, ops) = chain();
        // x is not declared as a graph input
        assert!(Graph::build(&ops, &catalog, &[], &[3]).is_err());
    }

    #[test]
    fn unproduced_output() {
        let (catalog, ops) = chain();
        assert!(Graph::build(&ops, &catalog, &[0], &[0]).is_err());
    }

    #[test]
    fn duplicate_names() {
        let mut catalog = TensorCatalog::default();
        let x = catalog.add_activation("x", &[1], DatumType::F32) as i32;
        let a = catalog.add_activation("a", &[1], DatumType::F32) as i32;
        let a2 = catalog.add_activation("a", &[1], DatumType::F32) as i32;
        let ops = vec![
            OperatorRecord::new(Op::Relu, tvec!(x), tvec!(a)),
            OperatorRecord::new(Op::Relu, tvec!(a), tvec!(a2)),
        ];
        assert!(Graph::build(&ops, &catalog, &[0], &[2]).is_err());
    }

    #[test]
    fn name_shadowed_by_constant() {
        // a constant carrying the name of a node output breaks name resolution
        let mut catalog = TensorCatalog::default();
        let x = catalog.add_activation("x", &[1], DatumType::F32) as i32;
        let a = catalog.add_activation("a", &[1], DatumType::F32) as i32;
        let shadow = catalog.add_f32_constant("a", &[1], &[0.0]) as i32;
        let b = catalog.add_activation("b", &[1], DatumType::F32) as i32;
        let ops = vec![
            OperatorRecord::new(Op::Relu, tvec!(x), tvec!(a)),
            OperatorRecord::new(add(), tvec!(x, shadow), tvec!(b)),
        ];
        let err = Graph::build(&ops, &catalog, &[0], &[3]).unwrap_err();
        assert!(format!("{err}").contains("Malformed edge data"));
    }

    #[test]
    fn unnamed_tensors() {
        let mut catalog = TensorCatalog::default();
        let x = catalog.add_activation("x", &[1], DatumType::F32) as i32;
        let a = catalog.add_activation("", &[1], DatumType::F32) as i32;
        let ops = vec![OperatorRecord::new(Op::Relu, tvec!(x, -1), tvec!(a))];
        let graph = Graph::build(&ops, &catalog, &[0], &[1]).unwrap();
        assert_eq!(graph.node(0).name, "tensor_1");
        assert_eq!(graph.by_name("tensor_1"), Some(0));
    }

    proptest! {
        #[test]
        fn edges_are_consistent(picks in prop::collection::vec((any::<Index>(), any::<Index>()), 1..12)) {
            let mut catalog = TensorCatalog::default();
            let mut available = vec![catalog.add_activation("x", &[1, 2], DatumType::F32) as i32];
            let mut ops = vec![];
            for (ix, (a, b)) in picks.iter().enumerate() {
                let out = catalog.add_activation(format!("t{ix}"), &[1, 2], DatumType::F32) as i32;
                ops.push(OperatorRecord::new(add(), tvec!(*a.get(&available), *b.get(&available)), tvec!(out)));
                available.push(out);
            }
            let last = *available.last().unwrap() as usize;
            let graph = Graph::build(&ops, &catalog, &[0], &[last]).unwrap();
            prop_assert_eq!(graph.len(), ops.len());
            for node in graph.iter() {
                prop_assert_eq!(graph.input_names(node.id).len(), graph.input_indices(node.id).unwrap().len());
                for &input in &node.inputs {
                    prop_assert!(input < node.id);
                    prop_assert!(graph.node(input).outputs.contains(&node.id));
                }
                for &output in &node.outputs {
                    prop_assert!(graph.node(output).inputs.contains(&node.id));
                }
                prop_assert!(node.outputs.iter().all_unique());
            }
        }
    }
}
