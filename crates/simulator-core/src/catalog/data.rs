//! Static catalog content.

use super::{Concept, InterfaceDirection, LayerInterface};

/// Layer record before its interface list is derived.
pub(super) struct LayerRecord {
    pub id: &'static str,
    pub name: &'static str,
    pub name_en: &'static str,
    pub description: &'static str,
    pub level: u8,
    pub color: &'static str,
    pub icon: &'static str,
    pub concepts: &'static [Concept],
    pub examples: &'static [&'static str],
}

pub(super) const CATALOG_DESCRIPTION: &str =
    "The classic layered structure of a computer system, from user applications down to physical devices";

const fn concept(
    id: &'static str,
    name: &'static str,
    name_en: &'static str,
    description: &'static str,
    examples: &'static [&'static str],
    related_concepts: &'static [&'static str],
) -> Concept {
    Concept {
        id,
        name,
        name_en,
        description,
        examples,
        related_concepts,
    }
}

const APPLICATION: &[Concept] = &[
    concept(
        "user-programs",
        "用户程序",
        "User Programs",
        "Applications written and run by users, such as text editors, games and browsers",
        &["Microsoft Word", "Chrome", "Games"],
        &["api-calls", "system-calls"],
    ),
    concept(
        "api-calls",
        "API调用",
        "API Calls",
        "Applications invoke system services and library functions through APIs",
        &["File I/O APIs", "Networking APIs", "GUI APIs"],
        &["user-programs", "system-calls"],
    ),
];

const HIGH_LEVEL: &[Concept] = &[
    concept(
        "programming-languages",
        "编程语言",
        "Programming Languages",
        "High-level languages offer abstract programming interfaces that hide implementation details",
        &["C/C++", "Java", "Python", "JavaScript"],
        &["compilers", "interpreters"],
    ),
    concept(
        "compilers",
        "编译器",
        "Compilers",
        "Programs that translate high-level source into machine code or intermediate code",
        &["GCC", "Clang", "MSVC", "JVM"],
        &["programming-languages", "assembly-code"],
    ),
    concept(
        "interpreters",
        "解释器",
        "Interpreters",
        "Programs that execute source or bytecode directly without producing a native binary",
        &["CPython", "V8", "Lua"],
        &["programming-languages", "compilers"],
    ),
];

const ASSEMBLY: &[Concept] = &[
    concept(
        "assembly-code",
        "汇编代码",
        "Assembly Code",
        "Low-level language using mnemonics that map one-to-one onto machine instructions",
        &["MOV AX, BX", "ADD EAX, EBX", "JMP LABEL"],
        &["assemblers", "machine-instructions"],
    ),
    concept(
        "assemblers",
        "汇编器",
        "Assemblers",
        "Programs that translate assembly code into machine code",
        &["NASM", "MASM", "GAS"],
        &["assembly-code", "machine-instructions"],
    ),
];

const SYSTEM: &[Concept] = &[
    concept(
        "operating-system",
        "操作系统",
        "Operating System",
        "System software that manages hardware resources and serves applications",
        &["Windows", "Linux", "macOS", "Android"],
        &["device-drivers", "system-calls"],
    ),
    concept(
        "device-drivers",
        "设备驱动程序",
        "Device Drivers",
        "Programs bridging the operating system and hardware devices",
        &["Graphics drivers", "Network drivers", "Audio drivers"],
        &["operating-system", "hardware-interface"],
    ),
    concept(
        "system-calls",
        "系统调用",
        "System Calls",
        "Controlled entry points through which programs request kernel services",
        &["read", "write", "fork", "mmap"],
        &["operating-system", "api-calls"],
    ),
    concept(
        "hardware-interface",
        "硬件接口",
        "Hardware Interface",
        "Registers, ports and interrupts through which software drives devices",
        &["Memory-mapped I/O", "Port I/O", "Interrupt lines"],
        &["device-drivers", "instruction-set"],
    ),
];

const ISA: &[Concept] = &[
    concept(
        "instruction-set",
        "指令集",
        "Instruction Set",
        "Every instruction a CPU can execute; defines the hardware/software interface",
        &["x86-64", "ARM", "RISC-V", "MIPS"],
        &["machine-instructions", "cpu-architecture"],
    ),
    concept(
        "machine-instructions",
        "机器指令",
        "Machine Instructions",
        "Binary instructions the CPU executes directly",
        &["10110000 01100001", "11000111 00000001"],
        &["instruction-set", "cpu-execution"],
    ),
];

const MICROARCHITECTURE: &[Concept] = &[
    concept(
        "cpu-architecture",
        "CPU架构",
        "CPU Architecture",
        "Internal organization and datapath design of a CPU",
        &["Pipelining", "Superscalar", "Out-of-order execution", "Branch prediction"],
        &["alu", "control-unit", "registers"],
    ),
    concept(
        "alu",
        "算术逻辑单元",
        "ALU",
        "CPU component performing arithmetic and logic operations",
        &["Adder", "Multiplier", "Gate array"],
        &["cpu-architecture", "logic-gates"],
    ),
    concept(
        "cpu-execution",
        "CPU执行",
        "CPU Execution",
        "The fetch, decode, execute, memory and write-back cycle every instruction passes through",
        &["Fetch", "Decode", "Execute", "Write back"],
        &["machine-instructions", "control-unit"],
    ),
    concept(
        "control-unit",
        "控制单元",
        "Control Unit",
        "Sequences the datapath by issuing control signals for each decoded instruction",
        &["Hardwired control", "Microcode"],
        &["cpu-architecture", "registers"],
    ),
    concept(
        "registers",
        "寄存器",
        "Registers",
        "Small fast storage inside the CPU holding operands, addresses and status",
        &["EAX", "ESP", "EIP", "FLAGS"],
        &["cpu-architecture", "alu"],
    ),
];

const LOGIC: &[Concept] = &[
    concept(
        "logic-gates",
        "逻辑门",
        "Logic Gates",
        "Electronic circuits implementing basic logic operations",
        &["AND gate", "OR gate", "NOT gate", "XOR gate"],
        &["boolean-algebra", "transistors"],
    ),
    concept(
        "boolean-algebra",
        "布尔代数",
        "Boolean Algebra",
        "The mathematics of logic operations",
        &["A AND B", "A OR B", "NOT A"],
        &["logic-gates", "digital-circuits"],
    ),
    concept(
        "digital-circuits",
        "数字电路",
        "Digital Circuits",
        "Gate networks forming combinational and sequential building blocks",
        &["Flip-flops", "Multiplexers", "Counters"],
        &["logic-gates", "boolean-algebra"],
    ),
];

const PHYSICAL: &[Concept] = &[
    concept(
        "transistors",
        "晶体管",
        "Transistors",
        "Basic electronic switches that digital circuits are built from",
        &["MOSFET", "BJT", "FinFET"],
        &["semiconductors", "integrated-circuits"],
    ),
    concept(
        "semiconductors",
        "半导体",
        "Semiconductors",
        "Base materials for transistors and integrated circuits",
        &["Silicon", "Germanium", "Gallium arsenide"],
        &["transistors", "chip-manufacturing"],
    ),
    concept(
        "integrated-circuits",
        "集成电路",
        "Integrated Circuits",
        "Many transistors fabricated together on a single die",
        &["CPUs", "DRAM", "FPGAs"],
        &["transistors", "chip-manufacturing"],
    ),
    concept(
        "chip-manufacturing",
        "芯片制造",
        "Chip Manufacturing",
        "Lithography and fabrication processes that turn wafers into chips",
        &["Photolithography", "Etching", "Doping"],
        &["semiconductors", "integrated-circuits"],
    ),
];

const fn interface(
    id: &'static str,
    name: &'static str,
    description: &'static str,
    from_layer: &'static str,
    to_layer: &'static str,
    direction: InterfaceDirection,
    protocols: &'static [&'static str],
) -> LayerInterface {
    LayerInterface {
        id,
        name,
        description,
        from_layer,
        to_layer,
        direction,
        protocols,
    }
}

pub(super) const INTERFACES: &[LayerInterface] = &[
    interface(
        "app-to-highlevel",
        "应用程序接口",
        "Applications call system functionality through language APIs",
        "application",
        "highlevel",
        InterfaceDirection::Downward,
        &["Function calls", "Library interfaces", "API calls"],
    ),
    interface(
        "highlevel-to-assembly",
        "编译接口",
        "Compilers translate high-level code into assembly",
        "highlevel",
        "assembly",
        InterfaceDirection::Downward,
        &["Lexical analysis", "Parsing", "Code generation"],
    ),
    interface(
        "assembly-to-system",
        "系统调用接口",
        "Assembly code reaches operating system services through system calls",
        "assembly",
        "system",
        InterfaceDirection::Bidirectional,
        &["System calls", "Interrupt handling", "Exception handling"],
    ),
    interface(
        "system-to-isa",
        "指令集接口",
        "The operating system controls hardware through the instruction set",
        "system",
        "isa",
        InterfaceDirection::Downward,
        &["Machine instructions", "Privileged instructions", "Interrupt vectors"],
    ),
    interface(
        "isa-to-microarch",
        "微架构接口",
        "The instruction set is realized in hardware by the microarchitecture",
        "isa",
        "microarch",
        InterfaceDirection::Downward,
        &["Instruction decode", "Pipeline control", "Resource scheduling"],
    ),
    interface(
        "microarch-to-logic",
        "逻辑实现接口",
        "The microarchitecture is built from digital logic circuits",
        "microarch",
        "logic",
        InterfaceDirection::Downward,
        &["Logic synthesis", "Timing control", "Signal propagation"],
    ),
    interface(
        "logic-to-physical",
        "物理实现接口",
        "Logic gates are realized by transistors and other physical devices",
        "logic",
        "physical",
        InterfaceDirection::Downward,
        &["Circuit layout", "Process technology", "Physical design"],
    ),
];

pub(super) const LAYERS: &[LayerRecord] = &[
    LayerRecord {
        id: "physical",
        name: "物理层",
        name_en: "Physical Layer",
        description: "Physical devices and materials a computer is made of",
        level: 0,
        color: "#64748B",
        icon: "chip",
        concepts: PHYSICAL,
        examples: &["Transistors", "Integrated circuits", "Semiconductor materials", "Chip fabrication"],
    },
    LayerRecord {
        id: "logic",
        name: "逻辑层",
        name_en: "Logic Layer",
        description: "Circuits implementing digital logic",
        level: 1,
        color: "#6366F1",
        icon: "circuit-board",
        concepts: LOGIC,
        examples: &["Logic gates", "Flip-flops", "Counters", "Digital circuits"],
    },
    LayerRecord {
        id: "microarch",
        name: "微架构层",
        name_en: "Microarchitecture Layer",
        description: "Internal organization and implementation of the CPU",
        level: 2,
        color: "#EC4899",
        icon: "zap",
        concepts: MICROARCHITECTURE,
        examples: &["Pipelines", "Caches", "Branch predictors", "Execution units"],
    },
    LayerRecord {
        id: "isa",
        name: "指令集架构层",
        name_en: "ISA Layer",
        description: "Instruction set architecture defining the hardware/software interface",
        level: 3,
        color: "#EF4444",
        icon: "cpu",
        concepts: ISA,
        examples: &["x86", "ARM", "RISC-V", "Machine code"],
    },
    LayerRecord {
        id: "system",
        name: "系统软件层",
        name_en: "System Software Layer",
        description: "System software managing hardware resources",
        level: 4,
        color: "#F59E0B",
        icon: "settings",
        concepts: SYSTEM,
        examples: &["OS kernel", "Device drivers", "System calls", "Interrupt handling"],
    },
    LayerRecord {
        id: "assembly",
        name: "汇编语言层",
        name_en: "Assembly Language Layer",
        description: "Low-level programming with mnemonics",
        level: 5,
        color: "#8B5CF6",
        icon: "terminal",
        concepts: ASSEMBLY,
        examples: &["MOV", "ADD", "JMP", "Assembly programs"],
    },
    LayerRecord {
        id: "highlevel",
        name: "高级语言层",
        name_en: "High-Level Language Layer",
        description: "High-level languages offering abstract programming interfaces",
        level: 6,
        color: "#3B82F6",
        icon: "code",
        concepts: HIGH_LEVEL,
        examples: &["C/C++ programs", "Java applications", "Python scripts", "JavaScript code"],
    },
    LayerRecord {
        id: "application",
        name: "应用层",
        name_en: "Application Layer",
        description: "Applications and software users interact with directly",
        level: 7,
        color: "#10B981",
        icon: "monitor",
        concepts: APPLICATION,
        examples: &["Text editors", "Web browsers", "Games", "Office suites"],
    },
];
