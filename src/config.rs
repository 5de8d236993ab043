//! Reservoir parameters: hardware constraints, weight distributions, and the
//! values derived from them.
//!
//! Parameters are plain structs with `Default` impls, so experiments override
//! only what they need with `..ConstraintSet::default()`. A full parameter set
//! can also be read from YAML.

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConstraintViolation};
use crate::population::BlockSet;

/// Topology constants of the reservoir and the hardware it is mapped onto.
///
/// Built once at parameter-load time and never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstraintSet {
    /// Number of chips available. Default: 1
    pub num_chips: usize,
    /// Cores per chip. Default: 128
    pub num_cores_per_chip: usize,
    /// Maximum neurons mapped onto one core. Default: 256
    pub neurons_per_core: usize,
    /// Excitatory population size. Default: 2048
    pub reservoir_ex_size: usize,
    /// Inhibitory population size. Default: 512
    pub reservoir_in_size: usize,
    /// Fixed in-degree of every neuron across both source populations. Default: 100
    pub num_connections_per_neuron: usize,
    /// Neurons driven by the cue input patch. Default: 100
    pub cue_patch_neurons: usize,
    /// Maximum synapses packed into one connection chunk. Default: 16384
    pub max_synapses_per_core: usize,
}

impl Default for ConstraintSet {
    fn default() -> Self {
        Self {
            num_chips: 1,
            num_cores_per_chip: 128,
            neurons_per_core: 256,
            reservoir_ex_size: 2048,
            reservoir_in_size: 512,
            num_connections_per_neuron: 100,
            cue_patch_neurons: 100,
            max_synapses_per_core: 16384,
        }
    }
}

impl ConstraintSet {
    /// Number of fields in [`ConstraintSet::schema`].
    pub const FIELD_COUNT: usize = 8;

    /// Total neurons across both populations.
    #[inline]
    pub fn reservoir_size(&self) -> usize {
        self.reservoir_ex_size.saturating_add(self.reservoir_in_size)
    }

    /// Cores the hardware provides in total.
    #[inline]
    pub fn available_cores(&self) -> usize {
        self.num_chips.saturating_mul(self.num_cores_per_chip)
    }

    /// Ordered `(name, value)` list of every parameter.
    pub fn schema(&self) -> [(&'static str, usize); Self::FIELD_COUNT] {
        [
            ("num_chips", self.num_chips),
            ("num_cores_per_chip", self.num_cores_per_chip),
            ("neurons_per_core", self.neurons_per_core),
            ("reservoir_ex_size", self.reservoir_ex_size),
            ("reservoir_in_size", self.reservoir_in_size),
            ("num_connections_per_neuron", self.num_connections_per_neuron),
            ("cue_patch_neurons", self.cue_patch_neurons),
            ("max_synapses_per_core", self.max_synapses_per_core),
        ]
    }

    /// Values computed from the raw parameters.
    pub fn derived(&self) -> DerivedParams {
        DerivedParams::compute(self)
    }

    /// Check feasibility, in order: in-degree, cue patch, core capacity,
    /// synapse limit. Returns the first rule broken.
    pub fn validate(&self) -> Result<(), ConstraintViolation> {
        let derived = self.derived();

        if self.num_connections_per_neuron > derived.reservoir_size {
            return Err(ConstraintViolation::InDegreeExceedsReservoir {
                requested: self.num_connections_per_neuron,
                total: derived.reservoir_size,
            });
        }

        if self.cue_patch_neurons > derived.reservoir_size {
            return Err(ConstraintViolation::CuePatchExceedsReservoir {
                cue: self.cue_patch_neurons,
                total: derived.reservoir_size,
            });
        }

        if self.neurons_per_core == 0 {
            return Err(ConstraintViolation::ZeroNeuronsPerCore);
        }
        if derived.ex_cores > derived.available_cores {
            return Err(ConstraintViolation::CoreCapacity {
                required: derived.ex_cores,
                available: derived.available_cores,
            });
        }

        if self.max_synapses_per_core == 0 {
            return Err(ConstraintViolation::ZeroSynapsesPerCore);
        }

        Ok(())
    }
}

impl fmt::Display for ConstraintSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let schema = self.schema();
        let width = schema.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
        for (name, value) in schema {
            writeln!(f, "{name:<width$}  {value}")?;
        }
        Ok(())
    }
}

/// Validate a constraint set. See [`ConstraintSet::validate`].
pub fn validate(constraints: &ConstraintSet) -> Result<(), ConstraintViolation> {
    constraints.validate()
}

/// How many of a target neuron's incoming connections come from each
/// source population. `from_ex + from_in` is always the configured in-degree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InDegreeSplit {
    pub from_ex: usize,
    pub from_in: usize,
}

/// Values computed from a [`ConstraintSet`] before it is validated.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DerivedParams {
    pub reservoir_size: usize,
    pub available_cores: usize,
    /// Cores needed by the excitatory population. 0 when `neurons_per_core` is 0.
    pub ex_cores: usize,
    /// Cores needed by the inhibitory population. 0 when `neurons_per_core` is 0.
    pub in_cores: usize,
    /// Fraction of possible sources each neuron connects to.
    pub connection_density: f64,
    pub in_degree: InDegreeSplit,
}

impl DerivedParams {
    pub fn compute(c: &ConstraintSet) -> Self {
        let total = c.reservoir_size();
        let k = c.num_connections_per_neuron;
        let cores_for = |n: usize| {
            if c.neurons_per_core == 0 {
                0
            } else {
                n.div_ceil(c.neurons_per_core)
            }
        };

        // Proportional split rounded half up, so each block's in-degree
        // tracks its share of the source neurons. Widened so the products
        // cannot overflow.
        let from_ex = if total == 0 {
            0
        } else {
            let (k, ex, total) = (k as u128, c.reservoir_ex_size as u128, total as u128);
            ((2 * k * ex + total) / (2 * total)).min(k) as usize
        };

        Self {
            reservoir_size: total,
            available_cores: c.available_cores(),
            ex_cores: cores_for(c.reservoir_ex_size),
            in_cores: cores_for(c.reservoir_in_size),
            connection_density: if total == 0 { 0.0 } else { k as f64 / total as f64 },
            in_degree: InDegreeSplit { from_ex, from_in: k - from_ex },
        }
    }
}

/// Distribution weight magnitudes are drawn from. The block's sign is
/// applied afterwards, so only magnitudes are described here.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WeightDistribution {
    /// Every synapse gets the same magnitude.
    Constant { value: f32 },
    /// Uniform on `[low, high]`, `0 <= low <= high`.
    Uniform { low: f32, high: f32 },
    /// `exp(N(mu, sigma))`.
    LogNormal { mu: f32, sigma: f32 },
    /// `|N(0, sigma)|`.
    HalfNormal { sigma: f32 },
}

impl WeightDistribution {
    /// Largest uniform bound accepted. The uniform sampler panics on spans
    /// close to `f32::MAX`.
    pub const MAX_UNIFORM_BOUND: f32 = 1.0e30;

    /// Reason the parameters are unusable, if any.
    pub fn check(&self) -> Result<(), String> {
        let finite = |name: &str, v: f32| {
            if v.is_finite() {
                Ok(())
            } else {
                Err(format!("{name} must be finite, got {v}"))
            }
        };
        match *self {
            Self::Constant { value } => {
                finite("value", value)?;
                if value < 0.0 {
                    return Err(format!("constant magnitude must be >= 0, got {value}"));
                }
            }
            Self::Uniform { low, high } => {
                finite("low", low)?;
                finite("high", high)?;
                if low < 0.0 || low > high {
                    return Err(format!("uniform bounds need 0 <= low <= high, got [{low}, {high}]"));
                }
                if high > Self::MAX_UNIFORM_BOUND {
                    return Err(format!("uniform high must be <= {:e}, got {high}", Self::MAX_UNIFORM_BOUND));
                }
            }
            Self::LogNormal { mu, sigma } => {
                finite("mu", mu)?;
                finite("sigma", sigma)?;
                if sigma < 0.0 {
                    return Err(format!("sigma must be >= 0, got {sigma}"));
                }
            }
            Self::HalfNormal { sigma } => {
                finite("sigma", sigma)?;
                if sigma < 0.0 {
                    return Err(format!("sigma must be >= 0, got {sigma}"));
                }
            }
        }
        Ok(())
    }
}

impl Default for WeightDistribution {
    fn default() -> Self {
        Self::LogNormal { mu: 0.0, sigma: 0.5 }
    }
}

/// Weight drawing parameters for all four blocks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightParams {
    pub distributions: BlockSet<WeightDistribution>,
    /// Multiplier for blocks with an excitatory source. Default: 1.0
    pub ex_coefficient: f32,
    /// Multiplier for blocks with an inhibitory source. Default: 2.0
    pub in_coefficient: f32,
}

impl Default for WeightParams {
    fn default() -> Self {
        Self {
            distributions: BlockSet::default(),
            ex_coefficient: 1.0,
            in_coefficient: 2.0,
        }
    }
}

/// Cue input: off-core spike generators wired onto the cue patch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CueParams {
    /// Number of cue spike generators. Default: 20
    pub generators: usize,
    /// Generators feeding each patch neuron. Default: 4
    pub in_degree: usize,
    pub distribution: WeightDistribution,
    /// Multiplier on drawn magnitudes. Cue synapses are always excitatory. Default: 1.0
    pub coefficient: f32,
}

impl Default for CueParams {
    fn default() -> Self {
        Self {
            generators: 20,
            in_degree: 4,
            distribution: WeightDistribution::default(),
            coefficient: 1.0,
        }
    }
}

/// Complete parameter file: constraints, weights and seed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkParams {
    pub constraints: ConstraintSet,
    pub weights: WeightParams,
    pub cue: CueParams,
    pub seed: u64,
}

impl Default for NetworkParams {
    fn default() -> Self {
        Self {
            constraints: ConstraintSet::default(),
            weights: WeightParams::default(),
            cue: CueParams::default(),
            seed: 42,
        }
    }
}

impl NetworkParams {
    /// Read parameters from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|source| ConfigError::Io { path: path.clone(), source })?;
        let reader = BufReader::new(file);
        serde_yaml::from_reader(reader).map_err(|source| ConfigError::Parse { path, source })
    }

    /// Parse parameters from YAML text.
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })
    }
}
