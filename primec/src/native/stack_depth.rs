//! Worklist stack-depth analysis over a function's CFG.
//!
//! Driven by the shared opcode metadata so it cannot disagree with the VM
//! about stack effects. Every reachable instruction must be entered at one
//! consistent depth; the maximum over all program points sizes the native
//! operand-stack region.

use crate::ir::{IrFunction, IrOpcode};

use super::EmitError;

pub(super) fn compute_max_stack_depth(function: &IrFunction) -> Result<i64, EmitError> {
    let instructions = &function.instructions;
    if instructions.is_empty() {
        return Err(EmitError::EmptyFunction);
    }

    const UNSET: i64 = i64::MIN;
    let mut depth = vec![UNSET; instructions.len()];
    let mut worklist = vec![0usize];
    depth[0] = 0;
    let mut max_depth = 0i64;

    while let Some(index) = worklist.pop() {
        let current_depth = depth[index];
        max_depth = max_depth.max(current_depth);
        let inst = &instructions[index];
        let next_depth = current_depth + i64::from(inst.op.stack_delta());
        if next_depth < 0 {
            return Err(EmitError::InvalidStackUsage {
                index,
                opcode: inst.op.name(),
            });
        }
        max_depth = max_depth.max(next_depth);

        let mut push_successor =
            |next_index: usize, depth: &mut Vec<i64>, worklist: &mut Vec<usize>| {
                if next_index >= instructions.len() {
                    return Ok(());
                }
                if depth[next_index] == UNSET {
                    depth[next_index] = next_depth;
                    worklist.push(next_index);
                    return Ok(());
                }
                if depth[next_index] != next_depth {
                    return Err(EmitError::InconsistentStackDepth {
                        index: next_index,
                        opcode: instructions[next_index].op.name(),
                    });
                }
                Ok(())
            };

        if inst.op.is_terminator() {
            continue;
        }
        if matches!(inst.op, IrOpcode::Jump | IrOpcode::JumpIfZero) {
            if inst.imm > instructions.len() as u64 {
                return Err(EmitError::InvalidJumpTarget);
            }
            push_successor(inst.imm as usize, &mut depth, &mut worklist)?;
            if inst.op == IrOpcode::JumpIfZero {
                push_successor(index + 1, &mut depth, &mut worklist)?;
            }
            continue;
        }
        push_successor(index + 1, &mut depth, &mut worklist)?;
    }
    Ok(max_depth)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::IrInstruction;

    fn function(instructions: Vec<IrInstruction>) -> IrFunction {
        IrFunction {
            name: "/main".to_string(),
            instructions,
        }
    }

    fn inst(op: IrOpcode, imm: u64) -> IrInstruction {
        IrInstruction::new(op, imm)
    }

    #[test]
    fn test_straight_line_depth() {
        let f = function(vec![
            inst(IrOpcode::PushI32, 1),
            inst(IrOpcode::PushI32, 2),
            inst(IrOpcode::AddI32, 0),
            inst(IrOpcode::ReturnI32, 0),
        ]);
        assert_eq!(compute_max_stack_depth(&f).unwrap(), 2);
    }

    #[test]
    fn test_branches_must_agree() {
        // Both arms reach the join at depth 1.
        let f = function(vec![
            inst(IrOpcode::PushI32, 1),
            inst(IrOpcode::JumpIfZero, 4),
            inst(IrOpcode::PushI32, 7),
            inst(IrOpcode::Jump, 5),
            inst(IrOpcode::PushI32, 3),
            inst(IrOpcode::ReturnI32, 0),
        ]);
        assert_eq!(compute_max_stack_depth(&f).unwrap(), 1);
    }

    #[test]
    fn test_inconsistent_merge_depth_rejected() {
        // The fall-through path reaches index 3 at depth 1, the jump path
        // at depth 0.
        let f = function(vec![
            inst(IrOpcode::PushI32, 1),
            inst(IrOpcode::JumpIfZero, 3),
            inst(IrOpcode::PushI32, 7),
            inst(IrOpcode::ReturnI32, 0),
        ]);
        assert!(matches!(
            compute_max_stack_depth(&f),
            Err(EmitError::InconsistentStackDepth { .. })
        ));
    }

    #[test]
    fn test_underflow_rejected() {
        let f = function(vec![inst(IrOpcode::Pop, 0), inst(IrOpcode::ReturnVoid, 0)]);
        assert!(matches!(
            compute_max_stack_depth(&f),
            Err(EmitError::InvalidStackUsage { index: 0, .. })
        ));
    }

    #[test]
    fn test_empty_function_rejected() {
        let f = function(vec![]);
        assert!(matches!(
            compute_max_stack_depth(&f),
            Err(EmitError::EmptyFunction)
        ));
    }

    #[test]
    fn test_invalid_jump_target_rejected() {
        let f = function(vec![inst(IrOpcode::Jump, 9)]);
        assert!(matches!(
            compute_max_stack_depth(&f),
            Err(EmitError::InvalidJumpTarget)
        ));
    }

    #[test]
    fn test_code_after_terminator_can_differ() {
        // The return ends its path; the loop body after it starts fresh
        // from the jump.
        let f = function(vec![
            inst(IrOpcode::PushI32, 0),
            inst(IrOpcode::ReturnI32, 0),
            inst(IrOpcode::PushI32, 1),
            inst(IrOpcode::Pop, 0),
            inst(IrOpcode::ReturnVoid, 0),
        ]);
        // Index 2 is unreachable from index 0, so analysis stops at the
        // return and the unreachable tail is never visited.
        assert_eq!(compute_max_stack_depth(&f).unwrap(), 1);
    }
}
