//! VM benchmark binary.
//!
//! Measures assembly, verification and execution time for representative programs.
//! Run with: `cargo run --release --bin bench`

use std::io::{self, Sink};
use std::time::{Duration, Instant};

use dkvm::config::Config;
use dkvm::virtual_machine::assembler::assemble_source;
use dkvm::virtual_machine::program::Program;
use dkvm::virtual_machine::verifier::verify;
use dkvm::virtual_machine::vm::{StreamConsole, VM};

type BenchConsole = StreamConsole<&'static [u8], Sink>;

// ---------------------------------------------------------------------------
// Benchmark harness
// ---------------------------------------------------------------------------

struct BenchResult {
    name: &'static str,
    iterations: u64,
    total: Duration,
    /// Estimated number of instructions executed per run (None to omit column).
    est_instructions: Option<u64>,
}

impl BenchResult {
    fn avg(&self) -> Duration {
        self.total / self.iterations.max(1) as u32
    }

    fn print(&self) {
        let ns_per_op = self.avg().as_nanos();
        let ns_per_instr = self
            .est_instructions
            .filter(|&n| n > 0)
            .map(|n| format!("{:>8.1}", ns_per_op as f64 / n as f64))
            .unwrap_or_else(|| "       -".to_string());
        println!(
            "  {:<30} {:>7} iters {:>10.3} us/iter  {} ns/instr",
            self.name,
            self.iterations,
            ns_per_op as f64 / 1000.0,
            ns_per_instr,
        );
    }
}

/// Runs `f` for at least `min_duration`, returning aggregated results.
fn bench<F>(
    name: &'static str,
    min_duration: Duration,
    est_instructions: Option<u64>,
    mut f: F,
) -> BenchResult
where
    F: FnMut(),
{
    // Warmup
    for _ in 0..5 {
        f();
    }

    let mut iterations = 0u64;
    let start = Instant::now();
    while start.elapsed() < min_duration {
        f();
        iterations += 1;
    }

    BenchResult {
        name,
        iterations,
        total: start.elapsed(),
        est_instructions,
    }
}

/// Verifies and executes `program` with no input and discarded output.
fn execute(program: &Program, config: &Config) {
    let console: BenchConsole = StreamConsole::new("".as_bytes(), io::sink());
    let mut vm = VM::new(program.clone(), console, config).expect("verify failed");
    vm.run().expect("run failed");
}

// ---------------------------------------------------------------------------
// Benchmark definitions
// ---------------------------------------------------------------------------

const TIGHT_LOOP_ASM: &str = "
PUSH 100000
POP rax
PUSH 0
PUSH 0
:loop
POP
POP
PUSH rax
DEC
POP rax
PUSH rax
PUSH 0
JA :loop
";

const ARITHMETIC_MIX_ASM: &str = "
PUSH 10000
POP rcx
PUSH 0
PUSH 0
:loop
POP
POP
PUSH rcx
PUSH 3
MUL
PUSH 7
ADD
PUSH 2
DIV
SQRT
SIN
POP rdx
PUSH rcx
DEC
POP rcx
PUSH rcx
PUSH 0
JA :loop
";

const CALL_OVERHEAD_ASM: &str = "
PUSH 10000
POP rax
PUSH 0
PUSH 0
:loop
POP
POP
PUSH rax
CALL twice
POP rbx
PUSH rax
DEC
POP rax
PUSH rax
PUSH 0
JA :loop
END
FD twice 1 1
GET_ARG 0
PUSH 2
MUL
SET_LOCAL 0
GET_LOCAL 0
RET
ENDFUNC
";

const MEMORY_ASM: &str = "
PUSH 5000
POP rax
PUSH 0
PUSH 0
:loop
POP
POP
PUSH rax
POP [rax]
PUSH [rax]
POP rbx
PUSH rax
DEC
POP rax
PUSH rax
PUSH 0
JA :loop
";

// Conditional jumps push both compared values back. Each loop starts by popping the
// pair left by the previous JA (or the seeded zeros), so the stack stays a few
// elements deep and every guarded-stack check is cheap.

// tight_loop: 4 + 100K*(9)
const TIGHT_LOOP_INSTRS: u64 = 4 + 100_000 * 9;
// arithmetic_mix: 4 + 10K*(18)
const ARITH_MIX_INSTRS: u64 = 4 + 10_000 * 18;
// call_overhead: 4 + 10K*(12 + 6 in the callee)
const CALL_INSTRS: u64 = 4 + 10_000 * 18;
// memory: 4 + 5K*(12)
const MEM_INSTRS: u64 = 4 + 5_000 * 12;

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() {
    let min = Duration::from_secs(2);
    let config = Config::default();

    println!("VM Benchmarks (each runs for >= 2s)\n");
    println!(
        "  {:<30} {:>7}       {:>14}  {:>10}",
        "benchmark", "iters", "avg time", "ns/instr"
    );
    println!("  {}", "-".repeat(70));

    let sources = [
        ("tight_loop(100K)", TIGHT_LOOP_ASM, TIGHT_LOOP_INSTRS),
        ("arithmetic_mix(10K)", ARITHMETIC_MIX_ASM, ARITH_MIX_INSTRS),
        ("call_overhead(10K)", CALL_OVERHEAD_ASM, CALL_INSTRS),
        ("mem_load_store(5K)", MEMORY_ASM, MEM_INSTRS),
    ];

    // 1. Assembly
    let r = bench("assemble(all)", min, None, || {
        for (_, source, _) in &sources {
            assemble_source(source).expect("asm");
        }
    });
    r.print();

    // Pre-assemble programs (assembly cost excluded from the remaining benchmarks)
    let programs: Vec<_> = sources
        .iter()
        .map(|&(name, source, instrs)| (name, assemble_source(source).expect("asm"), instrs))
        .collect();

    // 2. Verification
    let r = bench("verify(all)", min, None, || {
        for (_, program, _) in &programs {
            verify(program).expect("verify");
        }
    });
    r.print();

    // 3. Execution
    for (name, program, instrs) in &programs {
        let r = bench(*name, min, Some(*instrs), || execute(program, &config));
        r.print();
    }

    println!();
}
