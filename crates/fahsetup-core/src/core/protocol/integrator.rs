use super::functions::LAMBDA;
use super::nonequilibrium::NonequilibriumProtocol;
use super::splitting::Substep;
use std::collections::HashMap;

/// One instruction of a custom integrator program.
#[derive(Debug, Clone, PartialEq)]
pub enum Computation {
    ComputeGlobal { variable: String, expression: String },
    ComputePerDof { variable: String, expression: String },
    ComputeSum { variable: String, expression: String },
    ConstrainPositions,
    ConstrainVelocities,
    UpdateContextState,
    BeginIf { condition: String },
    BeginWhile { condition: String },
    EndBlock,
}

impl Computation {
    /// Numeric computation type used by the serialized integrator format.
    pub fn type_code(&self) -> u8 {
        match self {
            Computation::ComputeGlobal { .. } => 0,
            Computation::ComputePerDof { .. } => 1,
            Computation::ComputeSum { .. } => 2,
            Computation::ConstrainPositions => 3,
            Computation::ConstrainVelocities => 4,
            Computation::UpdateContextState => 5,
            Computation::BeginIf { .. } => 6,
            Computation::BeginWhile { .. } => 7,
            Computation::EndBlock => 8,
        }
    }

    pub fn variable(&self) -> &str {
        match self {
            Computation::ComputeGlobal { variable, .. }
            | Computation::ComputePerDof { variable, .. }
            | Computation::ComputeSum { variable, .. } => variable,
            _ => "",
        }
    }

    pub fn expression(&self) -> &str {
        match self {
            Computation::ComputeGlobal { expression, .. }
            | Computation::ComputePerDof { expression, .. }
            | Computation::ComputeSum { expression, .. } => expression,
            Computation::BeginIf { condition } | Computation::BeginWhile { condition } => {
                condition
            }
            _ => "",
        }
    }
}

/// A programmable integrator definition, ready for serialization.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomIntegrator {
    pub step_size_ps: f64,
    pub constraint_tolerance: f64,
    /// Zero lets the simulation engine pick a seed.
    pub random_seed: i32,
    pub kinetic_energy: String,
    global_variables: Vec<(String, f64)>,
    per_dof_variables: Vec<String>,
    computations: Vec<Computation>,
}

impl CustomIntegrator {
    pub fn new(step_size_ps: f64) -> Self {
        Self {
            step_size_ps,
            constraint_tolerance: 1e-5,
            random_seed: 0,
            kinetic_energy: "m*v*v/2".to_string(),
            global_variables: Vec::new(),
            per_dof_variables: Vec::new(),
            computations: Vec::new(),
        }
    }

    /// Declares a global variable, or resets its initial value if already declared.
    pub fn add_global_variable(&mut self, name: &str, initial_value: f64) {
        match self.global_variables.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = initial_value,
            None => self.global_variables.push((name.to_string(), initial_value)),
        }
    }

    pub fn add_per_dof_variable(&mut self, name: &str) {
        if !self.per_dof_variables.iter().any(|n| n == name) {
            self.per_dof_variables.push(name.to_string());
        }
    }

    pub fn add_compute_global(&mut self, variable: &str, expression: &str) {
        self.computations.push(Computation::ComputeGlobal {
            variable: variable.to_string(),
            expression: expression.to_string(),
        });
    }

    pub fn add_compute_per_dof(&mut self, variable: &str, expression: &str) {
        self.computations.push(Computation::ComputePerDof {
            variable: variable.to_string(),
            expression: expression.to_string(),
        });
    }

    pub fn add_compute_sum(&mut self, variable: &str, expression: &str) {
        self.computations.push(Computation::ComputeSum {
            variable: variable.to_string(),
            expression: expression.to_string(),
        });
    }

    pub fn add_constrain_positions(&mut self) {
        self.computations.push(Computation::ConstrainPositions);
    }

    pub fn add_constrain_velocities(&mut self) {
        self.computations.push(Computation::ConstrainVelocities);
    }

    pub fn add_update_context_state(&mut self) {
        self.computations.push(Computation::UpdateContextState);
    }

    pub fn begin_if_block(&mut self, condition: &str) {
        self.computations.push(Computation::BeginIf {
            condition: condition.to_string(),
        });
    }

    pub fn begin_while_block(&mut self, condition: &str) {
        self.computations.push(Computation::BeginWhile {
            condition: condition.to_string(),
        });
    }

    pub fn end_block(&mut self) {
        self.computations.push(Computation::EndBlock);
    }

    pub fn global_variables(&self) -> &[(String, f64)] {
        &self.global_variables
    }

    pub fn global_variable(&self, name: &str) -> Option<f64> {
        self.global_variables
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    pub fn per_dof_variables(&self) -> &[String] {
        &self.per_dof_variables
    }

    pub fn computations(&self) -> &[Computation] {
        &self.computations
    }

    /// Whether every `BeginIf`/`BeginWhile` is closed by an `EndBlock`.
    pub fn blocks_are_balanced(&self) -> bool {
        let mut depth: i64 = 0;
        for computation in &self.computations {
            match computation {
                Computation::BeginIf { .. } | Computation::BeginWhile { .. } => depth += 1,
                Computation::EndBlock => {
                    depth -= 1;
                    if depth < 0 {
                        return false;
                    }
                }
                _ => {}
            }
        }
        depth == 0
    }
}

/// Builder for the periodic nonequilibrium switching integrator.
///
/// The resulting program keeps a step counter within the current cycle. During the
/// two switching legs every `H` substep evaluates the alchemical functions at the new
/// `lambda` and accumulates the potential energy change into `protocol_work`, which
/// is reset when each leg starts. `Eold`, `Enew`, `lambda` and `protocol_work` are
/// global variables so the distributed client can record them periodically.
pub struct PeriodicNonequilibriumIntegrator;

impl PeriodicNonequilibriumIntegrator {
    pub fn build(protocol: &NonequilibriumProtocol) -> CustomIntegrator {
        let mut integrator = CustomIntegrator::new(protocol.timestep_ps());
        integrator.constraint_tolerance = protocol.constraint_tolerance;

        let splitting = &protocol.splitting;
        let n_o = splitting.thermostat_count().max(1) as f64;
        let h_o = protocol.timestep_ps() / n_o;
        let a = (-protocol.collision_rate_per_ps * h_o).exp();
        let b = (1.0 - (-2.0 * protocol.collision_rate_per_ps * h_o).exp()).sqrt();

        integrator.add_global_variable("kT", protocol.kt());
        integrator.add_global_variable("a", a);
        integrator.add_global_variable("b", b);
        integrator.add_global_variable(LAMBDA, 0.0);
        integrator.add_global_variable("protocol_work", 0.0);
        integrator.add_global_variable("Eold", 0.0);
        integrator.add_global_variable("Enew", 0.0);
        integrator.add_global_variable("step", 0.0);
        integrator.add_global_variable("cycle", 0.0);
        integrator.add_global_variable("n_steps_eq", protocol.nsteps_eq as f64);
        integrator.add_global_variable("n_steps_neq", protocol.nsteps_neq as f64);
        integrator.add_global_variable("n_steps_per_cycle", protocol.steps_per_cycle() as f64);
        integrator.add_global_variable("reverse_start", protocol.reverse_start() as f64);
        integrator.add_global_variable("forward", 0.0);
        integrator.add_global_variable("reverse", 0.0);
        if protocol.measure_shadow_work {
            for name in ["shadow_work", "heat", "old_ke", "new_ke", "old_pe", "new_pe"] {
                integrator.add_global_variable(name, 0.0);
            }
        }
        integrator.add_per_dof_variable("sigma");
        integrator.add_per_dof_variable("x1");

        integrator.add_update_context_state();
        integrator.add_compute_per_dof("sigma", "sqrt(kT/m)");

        // Which leg of the cycle this step belongs to.
        integrator.add_compute_global(
            "forward",
            "step(step - n_steps_eq) * (1 - step(step - (n_steps_eq + n_steps_neq)))",
        );
        integrator.add_compute_global("reverse", "step(step - reverse_start)");
        for start in ["n_steps_eq", "reverse_start"] {
            integrator.begin_if_block(&format!("step = {}", start));
            integrator.add_compute_global("protocol_work", "0");
            integrator.end_block();
        }

        let mut velocity_counts: HashMap<Option<u8>, usize> = HashMap::new();
        for substep in splitting.substeps() {
            if let Substep::Velocity(group) = substep {
                *velocity_counts.entry(*group).or_default() += 1;
            }
        }
        let n_r = splitting.position_count().max(1);

        for substep in splitting.substeps() {
            match substep {
                Substep::Velocity(group) => {
                    let n_v = velocity_counts.get(group).copied().unwrap_or(1);
                    let force = match group {
                        Some(g) => format!("f{}", g),
                        None => "f".to_string(),
                    };
                    Self::deterministic(&mut integrator, protocol, |i| {
                        i.add_compute_per_dof("v", &format!("v + (dt / {}) * {} / m", n_v, force));
                        i.add_constrain_velocities();
                    });
                }
                Substep::Position => {
                    Self::deterministic(&mut integrator, protocol, |i| {
                        i.add_compute_per_dof("x", &format!("x + (dt / {}) * v", n_r));
                        i.add_compute_per_dof("x1", "x");
                        i.add_constrain_positions();
                        i.add_compute_per_dof("v", &format!("v + (x - x1) / (dt / {})", n_r));
                        i.add_constrain_velocities();
                    });
                }
                Substep::Thermostat => {
                    if protocol.measure_shadow_work {
                        integrator.add_compute_sum("old_ke", "0.5*m*v*v");
                    }
                    integrator.add_compute_per_dof("v", "a * v + b * sigma * gaussian");
                    integrator.add_constrain_velocities();
                    if protocol.measure_shadow_work {
                        integrator.add_compute_sum("new_ke", "0.5*m*v*v");
                        integrator.add_compute_global("heat", "heat + (new_ke - old_ke)");
                    }
                }
                Substep::Perturbation => {
                    Self::perturbation(&mut integrator, protocol, "forward > 0", "(step - n_steps_eq + 1) / n_steps_neq");
                    Self::perturbation(&mut integrator, protocol, "reverse > 0", "1 - (step - reverse_start + 1) / n_steps_neq");
                }
                Substep::BlockStart | Substep::BlockEnd => {}
            }
        }

        integrator.add_compute_global("step", "step + 1");
        integrator.begin_if_block("step >= n_steps_per_cycle");
        integrator.add_compute_global("step", "0");
        integrator.add_compute_global("cycle", "cycle + 1");
        integrator.end_block();

        integrator
    }

    fn deterministic(
        integrator: &mut CustomIntegrator,
        protocol: &NonequilibriumProtocol,
        body: impl FnOnce(&mut CustomIntegrator),
    ) {
        if protocol.measure_shadow_work {
            integrator.add_compute_sum("old_ke", "0.5*m*v*v");
            integrator.add_compute_global("old_pe", "energy");
        }
        body(integrator);
        if protocol.measure_shadow_work {
            integrator.add_compute_sum("new_ke", "0.5*m*v*v");
            integrator.add_compute_global("new_pe", "energy");
            integrator.add_compute_global(
                "shadow_work",
                "shadow_work + (new_ke + new_pe) - (old_ke + old_pe)",
            );
        }
    }

    fn perturbation(
        integrator: &mut CustomIntegrator,
        protocol: &NonequilibriumProtocol,
        condition: &str,
        lambda_expression: &str,
    ) {
        integrator.begin_if_block(condition);
        integrator.add_compute_global("Eold", "energy");
        integrator.add_compute_global(LAMBDA, lambda_expression);
        for (parameter, expression) in protocol.functions.iter() {
            integrator.add_compute_global(parameter, expression);
        }
        integrator.add_compute_global("Enew", "energy");
        integrator.add_compute_global("protocol_work", "protocol_work + (Enew - Eold)");
        integrator.end_block();
    }
}
