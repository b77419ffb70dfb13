use clap::{Parser, Subcommand};
use std::process::ExitCode;

use randomx_jit::consts::CACHE_LINE_SIZE;
use randomx_jit::program::{Program, ProgramConfiguration, INSTRUCTION_SIZE};
use randomx_jit::{JitCompiler, JitConfig};

#[derive(Parser)]
#[command(name = "rxjit")]
#[command(about = "Compile RandomX programs to x86-64 machine code", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a seeded pseudo-random program and dump statistics
    Compile {
        /// Seed for the program generator
        #[arg(long, default_value_t = 0)]
        seed: u64,
        /// Compile in light mode (SuperscalarHash call instead of dataset read)
        #[arg(long)]
        light: bool,
        /// Dataset offset for light mode, in bytes
        #[arg(long, default_value_t = 0)]
        dataset_offset: u32,
        /// Number of generated-body bytes to hex-dump
        #[arg(long, default_value_t = 64)]
        dump: usize,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::Compile {
            seed,
            light,
            dataset_offset,
            dump,
        } => {
            if let Err(e) = compile(seed, light, dataset_offset, dump) {
                eprintln!("error: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    ExitCode::SUCCESS
}

/// xorshift64* stream, enough entropy for demo programs.
struct Generator(u64);

impl Generator {
    fn next_u64(&mut self) -> u64 {
        self.0 ^= self.0 >> 12;
        self.0 ^= self.0 << 25;
        self.0 ^= self.0 >> 27;
        self.0.wrapping_mul(0x2545F4914F6CDD1D)
    }
}

fn generate_program(seed: u64) -> (Program, ProgramConfiguration) {
    let mut gen = Generator(seed | 1);

    let mut bytes = [0u8; 256 * INSTRUCTION_SIZE];
    for chunk in bytes.chunks_exact_mut(8) {
        chunk.copy_from_slice(&gen.next_u64().to_le_bytes());
    }

    let entropy = gen.next_u64();
    // force the E-mask quadwords into a valid exponent pattern
    let e_mask = [
        (gen.next_u64() & 0x00FFFFFFFFFFFFFF) | 0x3B00000000000000,
        (gen.next_u64() & 0x00FFFFFFFFFFFFFF) | 0x3B00000000000000,
    ];
    let pcfg = ProgramConfiguration {
        read_reg0: (entropy & 7) as u8,
        read_reg1: ((entropy >> 8) & 7) as u8,
        read_reg2: ((entropy >> 16) & 7) as u8,
        read_reg3: ((entropy >> 24) & 7) as u8,
        e_mask,
    };

    (Program::from_bytes(&bytes), pcfg)
}

fn compile(seed: u64, light: bool, dataset_offset: u32, dump: usize) -> Result<(), String> {
    let (program, pcfg) = generate_program(seed);

    let mut jit = JitCompiler::with_config(JitConfig::default())
        .map_err(|e| format!("could not allocate the code buffer: {}", e))?;

    if light {
        jit.generate_program_light(&program, &pcfg, dataset_offset);
    } else {
        jit.generate_program(&program, &pcfg);
    }

    let body_start = randomx_jit::jit::fragments::PROLOGUE.len()
        + randomx_jit::jit::fragments::LOOP_LOAD.len();
    let end = jit.code_pos();

    println!("mode:           {}", if light { "light" } else { "full" });
    if light {
        println!("dataset item:   {}", dataset_offset / CACHE_LINE_SIZE);
    }
    println!("buffer size:    {} bytes", jit.code_size());
    println!("body start:     {:#06x}", body_start);
    println!("code end:       {:#06x}", end);
    println!("generated:      {} bytes", end - body_start);

    let window = dump.min(end - body_start);
    for (row, chunk) in jit.code()[body_start..body_start + window]
        .chunks(16)
        .enumerate()
    {
        let hex: Vec<String> = chunk.iter().map(|b| format!("{:02x}", b)).collect();
        println!("{:#06x}  {}", body_start + row * 16, hex.join(" "));
    }

    Ok(())
}
