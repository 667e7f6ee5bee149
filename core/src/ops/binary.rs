use super::array::operands;
use super::LowerOp;
use crate::internal::*;

pub fn add(op: &mut LowerOp) -> Result<()> {
    binary(op, "Add")
}

pub fn mul(op: &mut LowerOp) -> Result<()> {
    binary(op, "Mul")
}

fn binary(op: &mut LowerOp, op_type: &str) -> Result<()> {
    let rank = op.output_tensor()?.rank();
    let inputs = operands(op, rank)?;
    ensure!(inputs.len() == 2, "{} {} expects two operands, got {}", op_type, op.prefix, inputs.len());
    op.push_final(NodeProto::named(op_type, op.prefix).with_inputs(inputs))?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::super::test::*;
    use super::*;

    #[test]
    fn add_bias_vector() {
        let op = Op::Add { fused: FusedActivation::None };
        let model = unary(op, &[1, 2, 2, 3], &[1, 2, 2, 3], &[(&[3], vec![1.0, 2.0, 3.0])]);
        let lowered = single(&model);
        assert_eq!(op_types(&lowered), vec!["Add"]);
        assert_eq!(lowered.nodes[0].input, vec!["x", "y_input1"]);
        let bias = constant(&lowered, "y_input1");
        assert_eq!(bias.shape(), vec![3, 1, 1]);
        assert_eq!(bias.as_f32().unwrap(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn add_spatial_constant() {
        let op = Op::Add { fused: FusedActivation::None };
        let data = (0..12).map(|v| v as f32).collect();
        let model = unary(op, &[1, 2, 3, 2], &[1, 2, 3, 2], &[(&[2, 3, 2], data)]);
        let lowered = single(&model);
        let c = constant(&lowered, "y_input1");
        assert_eq!(c.shape(), vec![2, 2, 3]);
        // [h, w, c] -> [c, h, w]
        assert_eq!(
            c.as_f32().unwrap(),
            vec![0.0, 2.0, 4.0, 6.0, 8.0, 10.0, 1.0, 3.0, 5.0, 7.0, 9.0, 11.0]
        );
    }

    #[test]
    fn mul_row_constant() {
        let op = Op::Mul { fused: FusedActivation::None };
        let model = unary(op, &[1, 2, 3, 2], &[1, 2, 3, 2], &[(&[3, 2], vec![1., 2., 3., 4., 5., 6.])]);
        let lowered = single(&model);
        let c = constant(&lowered, "y_input1");
        assert_eq!(c.shape(), vec![2, 1, 3]);
        assert_eq!(c.as_f32().unwrap(), vec![1.0, 3.0, 5.0, 2.0, 4.0, 6.0]);
    }

    #[test]
    fn mul_scalar() {
        let op = Op::Mul { fused: FusedActivation::Relu };
        let model = unary(op, &[4, 6], &[4, 6], &[(&[], vec![0.5])]);
        let lowered = single(&model);
        assert_eq!(op_types(&lowered), vec!["Mul", "Relu"]);
        assert!(constant(&lowered, "y_input1").dims.is_empty());
        assert_eq!(lowered.nodes[1].input, vec!["y"]);
    }

    #[test]
    fn add_two_wires() {
        let mut catalog = TensorCatalog::default();
        let x = catalog.add_activation("x", &[1, 2, 2, 3], DatumType::F32);
        let a = catalog.add_activation("a", &[1, 2, 2, 3], DatumType::F32);
        let b = catalog.add_activation("b", &[1, 2, 2, 3], DatumType::F32);
        let model = SourceModel {
            catalog,
            operators: vec![
                OperatorRecord::new(Op::Relu, tvec!(x as i32), tvec!(a as i32)),
                OperatorRecord::new(
                    Op::Add { fused: FusedActivation::None },
                    tvec!(x as i32, a as i32),
                    tvec!(b as i32),
                ),
            ],
            inputs: tvec!(x),
            outputs: tvec!(b),
            description: None,
        };
        let lowered = single(&model);
        assert_eq!(lowered.nodes[0].input, vec!["x", "a"]);
        assert!(lowered.constants.is_empty());
    }
}
