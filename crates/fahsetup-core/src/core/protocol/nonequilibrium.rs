use super::functions::AlchemicalFunctions;
use super::splitting::Splitting;

/// Molar gas constant in kJ/(mol·K).
pub const MOLAR_GAS_CONSTANT: f64 = 0.008_314_462_618;

const FEMTOSECONDS_PER_PICOSECOND: f64 = 1000.0;

/// Parameters of a periodic nonequilibrium switching protocol.
///
/// One cycle is: equilibrate `nsteps_eq` steps at `lambda = 0`, switch to
/// `lambda = 1` over `nsteps_neq` steps, equilibrate `nsteps_eq` steps at
/// `lambda = 1`, and switch back over `nsteps_neq` steps.
#[derive(Debug, Clone, PartialEq)]
pub struct NonequilibriumProtocol {
    pub nsteps_eq: u64,
    pub nsteps_neq: u64,
    pub n_cycles: u64,
    pub timestep_fs: f64,
    pub temperature_kelvin: f64,
    pub collision_rate_per_ps: f64,
    pub constraint_tolerance: f64,
    pub measure_shadow_work: bool,
    pub splitting: Splitting,
    pub functions: AlchemicalFunctions,
}

impl NonequilibriumProtocol {
    pub fn steps_per_cycle(&self) -> u64 {
        2 * self.nsteps_eq + 2 * self.nsteps_neq
    }

    pub fn total_steps(&self) -> u64 {
        self.n_cycles * self.steps_per_cycle()
    }

    /// Number of integration steps per picosecond of simulated time.
    pub fn steps_per_ps(&self) -> u64 {
        (FEMTOSECONDS_PER_PICOSECOND / self.timestep_fs).round().max(1.0) as u64
    }

    pub fn timestep_ps(&self) -> f64 {
        self.timestep_fs / FEMTOSECONDS_PER_PICOSECOND
    }

    /// Thermal energy in kJ/mol.
    pub fn kt(&self) -> f64 {
        MOLAR_GAS_CONSTANT * self.temperature_kelvin
    }

    /// Step index (within a cycle) at which the forward switch starts.
    pub fn forward_start(&self) -> u64 {
        self.nsteps_eq
    }

    /// Step index (within a cycle) at which the reverse switch starts.
    pub fn reverse_start(&self) -> u64 {
        2 * self.nsteps_eq + self.nsteps_neq
    }

    /// Simulated time of one cycle in nanoseconds.
    pub fn cycle_length_ns(&self) -> f64 {
        self.steps_per_cycle() as f64 * self.timestep_fs / 1.0e6
    }
}
