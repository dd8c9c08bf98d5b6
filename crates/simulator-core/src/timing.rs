/// Instruction forms that have fixed cycle costs on the toy CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CycleCostKind {
    /// No-operation instruction.
    Nop,
    /// Halt instruction.
    Halt,
    /// Register/immediate move.
    Mov,
    /// Memory read.
    Load,
    /// Memory write.
    Store,
    /// Integer add/sub/logic/compare/shift class.
    Alu,
    /// Integer multiply.
    Mul,
    /// Integer divide.
    Div,
    /// Conditional or unconditional jump.
    Jump,
    /// Subroutine call.
    Call,
    /// Subroutine return.
    Ret,
    /// Stack push.
    Push,
    /// Stack pop.
    Pop,
}

/// Single source-of-truth cycle-cost table.
pub const CYCLE_COST_TABLE: &[(CycleCostKind, u32)] = &[
    (CycleCostKind::Nop, 1),
    (CycleCostKind::Halt, 1),
    (CycleCostKind::Mov, 1),
    (CycleCostKind::Load, 2),
    (CycleCostKind::Store, 2),
    (CycleCostKind::Alu, 1),
    (CycleCostKind::Mul, 3),
    (CycleCostKind::Div, 4),
    (CycleCostKind::Jump, 2),
    (CycleCostKind::Call, 2),
    (CycleCostKind::Ret, 2),
    (CycleCostKind::Push, 1),
    (CycleCostKind::Pop, 1),
];

/// Looks up the cycle cost for a cycle-cost kind.
#[must_use]
pub fn cycle_cost(kind: CycleCostKind) -> Option<u32> {
    CYCLE_COST_TABLE
        .iter()
        .find_map(|(entry_kind, cycles)| (*entry_kind == kind).then_some(*cycles))
}

/// Classifies a mnemonic for cycle costing.
///
/// `MOV` with a memory operand costs as a load or store depending on which
/// side the memory operand sits.
#[must_use]
pub fn cycle_cost_kind(
    mnemonic: &str,
    memory_destination: bool,
    memory_source: bool,
) -> Option<CycleCostKind> {
    let kind = match mnemonic.to_ascii_uppercase().as_str() {
        "NOP" => CycleCostKind::Nop,
        "HLT" => CycleCostKind::Halt,
        "MOV" if memory_destination => CycleCostKind::Store,
        "MOV" if memory_source => CycleCostKind::Load,
        "MOV" => CycleCostKind::Mov,
        "LOAD" => CycleCostKind::Load,
        "STORE" => CycleCostKind::Store,
        "ADD" | "SUB" | "INC" | "DEC" | "NEG" | "CMP" | "AND" | "OR" | "XOR" | "NOT" | "SHL"
        | "SHR" | "TEST" => CycleCostKind::Alu,
        "MUL" => CycleCostKind::Mul,
        "DIV" => CycleCostKind::Div,
        "JMP" | "JZ" | "JE" | "JNZ" | "JNE" | "JS" | "JNS" => CycleCostKind::Jump,
        "CALL" => CycleCostKind::Call,
        "RET" => CycleCostKind::Ret,
        "PUSH" => CycleCostKind::Push,
        "POP" => CycleCostKind::Pop,
        _ => return None,
    };
    Some(kind)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::{cycle_cost, cycle_cost_kind, CycleCostKind, CYCLE_COST_TABLE};

    #[test]
    fn table_contains_unique_kinds() {
        let kinds: HashSet<_> = CYCLE_COST_TABLE.iter().map(|(kind, _)| *kind).collect();
        assert_eq!(kinds.len(), CYCLE_COST_TABLE.len());
    }

    #[test]
    fn every_table_entry_resolves_via_lookup_and_is_positive() {
        for (kind, expected_cycles) in CYCLE_COST_TABLE {
            assert_eq!(cycle_cost(*kind), Some(*expected_cycles));
            assert!(*expected_cycles > 0);
        }
    }

    #[test]
    fn mov_cost_depends_on_memory_side() {
        assert_eq!(
            cycle_cost_kind("mov", false, false),
            Some(CycleCostKind::Mov)
        );
        assert_eq!(
            cycle_cost_kind("MOV", true, false),
            Some(CycleCostKind::Store)
        );
        assert_eq!(
            cycle_cost_kind("MOV", false, true),
            Some(CycleCostKind::Load)
        );
        assert_eq!(cycle_cost(CycleCostKind::Store), Some(2));
        assert_eq!(cycle_cost_kind("FROB", false, false), None);
    }
}
