//! The operator case catalog.
//!
//! Each case builds a module and example inputs from a fixed seed, so the
//! exported graph (initializer payloads included) is identical on every run.

use std::f32::consts::TAU;

use mlx_core::{CallArg, DType, Result as MlxResult, Shape, Tensor, Value, call_custom};
use mlx_nn::{
    BatchNorm2d, Conv2d, FuncModule, MaxPool1d, Module, ReflectionPad2d, init, tensor_arg,
};
use mlx_onnx::symbolic::attr_float;
use mlx_onnx::{ErrorCategory, ExportError, ExportOptions, Sym, SymbolicRegistry};
use rand::Rng;
use rand::rngs::StdRng;
use tracing::info;

use crate::error::Result;
use crate::harness::OperatorHarness;
use crate::snapshot::{SnapshotKey, SnapshotOutcome};

/// What a case asserts about its export.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Expectation {
    /// The canonical graph text matches the stored expectation.
    Graph,
    /// Export fails with an error of `category` whose message matches
    /// `pattern`.
    Raises {
        category: ErrorCategory,
        pattern: Option<&'static str>,
    },
}

/// A built case, ready to be exported.
pub struct CaseSpec {
    pub module: Box<dyn Module>,
    pub inputs: Vec<Value>,
    pub options: ExportOptions,
    pub expectation: Expectation,
}

impl CaseSpec {
    fn graph(module: impl Module + 'static, inputs: Vec<Value>) -> Self {
        Self {
            module: Box::new(module),
            inputs,
            options: ExportOptions::default(),
            expectation: Expectation::Graph,
        }
    }

    fn raises(mut self, category: ErrorCategory, pattern: Option<&'static str>) -> Self {
        self.expectation = Expectation::Raises { category, pattern };
        self
    }

    fn with_options(mut self, options: ExportOptions) -> Self {
        self.options = options;
        self
    }
}

#[derive(Clone, Copy)]
pub struct OperatorCase {
    pub name: &'static str,
    pub build: fn() -> MlxResult<CaseSpec>,
}

impl std::fmt::Debug for OperatorCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperatorCase").field("name", &self.name).finish()
    }
}

static CATALOG: [OperatorCase; 22] = [
    OperatorCase { name: "basic", build: basic },
    OperatorCase { name: "view", build: view },
    OperatorCase { name: "addconstant", build: addconstant },
    OperatorCase { name: "add_broadcast", build: add_broadcast },
    OperatorCase { name: "add_left_broadcast", build: add_left_broadcast },
    OperatorCase { name: "add_size1_broadcast", build: add_size1_broadcast },
    OperatorCase { name: "transpose", build: transpose },
    OperatorCase { name: "chunk", build: chunk },
    OperatorCase { name: "concat2", build: concat2 },
    OperatorCase { name: "mm", build: mm },
    OperatorCase { name: "addmm", build: addmm },
    OperatorCase { name: "permute2", build: permute2 },
    OperatorCase { name: "pad", build: pad },
    OperatorCase { name: "params", build: params },
    OperatorCase { name: "non_float_params", build: non_float_params },
    OperatorCase { name: "symbolic_mismatch", build: symbolic_mismatch },
    OperatorCase { name: "batchnorm", build: batchnorm },
    OperatorCase { name: "batchnorm_training", build: batchnorm_training },
    OperatorCase { name: "conv", build: conv },
    OperatorCase { name: "maxpool", build: maxpool },
    OperatorCase { name: "symbolic_override", build: symbolic_override },
    OperatorCase { name: "symbolic_override_nested", build: symbolic_override_nested },
];

/// Every operator case, in a fixed order.
pub fn catalog() -> &'static [OperatorCase] {
    &CATALOG
}

pub fn find(name: &str) -> Option<&'static OperatorCase> {
    CATALOG.iter().find(|c| c.name == name)
}

/// Build `case` and produce the text its expectation is compared against:
/// the canonical graph, or the failure message for cases that must not
/// export.
pub fn case_text(harness: &OperatorHarness, case: &OperatorCase) -> Result<String> {
    let CaseSpec {
        mut module,
        inputs,
        options,
        expectation,
    } = (case.build)()?;
    match expectation {
        Expectation::Graph => harness.export_text(case.name, module.as_mut(), &inputs, &options),
        Expectation::Raises { category, pattern } => harness.failure_text(
            case.name,
            category,
            pattern,
            module.as_mut(),
            &inputs,
            &options,
        ),
    }
}

/// Build `case` and compare its text with the stored expectation.
pub fn run_case(harness: &OperatorHarness, case: &OperatorCase) -> Result<SnapshotOutcome> {
    let text = case_text(harness, case)?;
    let outcome = harness.store().assert_expected(&SnapshotKey::new(case.name), &text)?;
    info!(case = case.name, ?outcome, "case passed");
    Ok(outcome)
}

// ── Inputs ──────────────────────────────────────────────────────────────

fn tensor(data: &[f32], dims: &[i64]) -> MlxResult<Tensor> {
    Tensor::from_f32(data, &Shape::new(dims.to_vec()))
}

fn typed(data: &[f32], dims: &[i64], dtype: DType) -> MlxResult<Tensor> {
    Tensor::from_data_with_dtype(data.to_vec(), &Shape::new(dims.to_vec()), dtype)
}

fn ones(dims: &[i64]) -> MlxResult<Tensor> {
    Tensor::ones(&Shape::new(dims.to_vec()), DType::F32)
}

/// Standard normal samples (Box-Muller).
fn randn(rng: &mut StdRng, dims: &[i64], dtype: DType) -> MlxResult<Tensor> {
    let shape = Shape::new(dims.to_vec());
    let data: Vec<f32> = (0..shape.numel())
        .map(|_| {
            let u1: f32 = 1.0 - rng.random::<f32>();
            let u2: f32 = rng.random::<f32>();
            (-2.0 * u1.ln()).sqrt() * (TAU * u2).cos()
        })
        .collect();
    Tensor::from_data_with_dtype(data, &shape, dtype)
}

fn binary_add() -> FuncModule {
    FuncModule::new(|args| Ok(tensor_arg(args, 0)?.add(tensor_arg(args, 1)?)?.into()))
}

/// `-sigmoid(tanh(x * (x + y)))`
fn squashed_product() -> impl Fn(&[Value]) -> MlxResult<Value> + Send + Sync + 'static {
    |args| {
        let x = tensor_arg(args, 0)?;
        let y = tensor_arg(args, 1)?;
        Ok(x.mul(&x.add(y)?)?.tanh().sigmoid().neg().into())
    }
}

// ── Cases ───────────────────────────────────────────────────────────────

fn basic() -> MlxResult<CaseSpec> {
    let inputs = vec![tensor(&[0.4], &[1])?.into(), tensor(&[0.7], &[1])?.into()];
    Ok(CaseSpec::graph(FuncModule::new(squashed_product()), inputs))
}

fn view() -> MlxResult<CaseSpec> {
    let m = FuncModule::new(|args| Ok(tensor_arg(args, 0)?.view(&[1, 1])?.into()));
    Ok(CaseSpec::graph(m, vec![tensor(&[0.0], &[1])?.into()]))
}

fn addconstant() -> MlxResult<CaseSpec> {
    let mut rng = init::seeded(3);
    let m = FuncModule::new(|args| Ok(tensor_arg(args, 0)?.add_scalar(1.0)?.into()));
    Ok(CaseSpec::graph(m, vec![randn(&mut rng, &[2, 3], DType::F64)?.into()]))
}

fn add_broadcast() -> MlxResult<CaseSpec> {
    let mut rng = init::seeded(4);
    let inputs = vec![
        randn(&mut rng, &[2, 3], DType::F64)?.into(),
        randn(&mut rng, &[3], DType::F64)?.into(),
    ];
    Ok(CaseSpec::graph(binary_add(), inputs))
}

fn add_left_broadcast() -> MlxResult<CaseSpec> {
    let mut rng = init::seeded(5);
    let inputs = vec![
        randn(&mut rng, &[3], DType::F64)?.into(),
        randn(&mut rng, &[2, 3], DType::F64)?.into(),
    ];
    Ok(CaseSpec::graph(binary_add(), inputs).raises(ErrorCategory::Runtime, None))
}

fn add_size1_broadcast() -> MlxResult<CaseSpec> {
    let mut rng = init::seeded(6);
    let inputs = vec![
        randn(&mut rng, &[2, 3], DType::F64)?.into(),
        randn(&mut rng, &[2, 1], DType::F64)?.into(),
    ];
    Ok(CaseSpec::graph(binary_add(), inputs).raises(ErrorCategory::Runtime, None))
}

fn transpose() -> MlxResult<CaseSpec> {
    let m = FuncModule::new(|args| {
        Ok(tensor_arg(args, 0)?.transpose(0, 1)?.transpose(1, 0)?.into())
    });
    Ok(CaseSpec::graph(m, vec![tensor(&[0.0, 1.0, 2.0, 3.0], &[2, 2])?.into()]))
}

fn chunk() -> MlxResult<CaseSpec> {
    let m = FuncModule::new(|args| Ok(tensor_arg(args, 0)?.chunk(2, 0)?.into()));
    Ok(CaseSpec::graph(m, vec![tensor(&[0.0, 1.0, 2.0], &[3])?.into()]))
}

fn concat2() -> MlxResult<CaseSpec> {
    let mut rng = init::seeded(9);
    let m = FuncModule::new(|args| {
        let parts = args
            .first()
            .ok_or_else(|| mlx_core::MlxError::InvalidArgument("concat2 takes one tuple".into()))?
            .flatten();
        Ok(Tensor::cat(&parts, 1)?.into())
    });
    let pair = Value::tuple([
        randn(&mut rng, &[2, 3], DType::F32)?.into(),
        randn(&mut rng, &[2, 3], DType::F32)?.into(),
    ]);
    Ok(CaseSpec::graph(m, vec![pair]))
}

fn mm() -> MlxResult<CaseSpec> {
    let mut rng = init::seeded(10);
    let m = FuncModule::new(|args| Ok(tensor_arg(args, 0)?.matmul(tensor_arg(args, 1)?)?.into()));
    let inputs = vec![
        randn(&mut rng, &[2, 3], DType::F32)?.into(),
        randn(&mut rng, &[3, 4], DType::F32)?.into(),
    ];
    Ok(CaseSpec::graph(m, inputs))
}

fn addmm() -> MlxResult<CaseSpec> {
    let mut rng = init::seeded(11);
    let m = FuncModule::new(|args| {
        let (m1, m2, bias) = (tensor_arg(args, 0)?, tensor_arg(args, 1)?, tensor_arg(args, 2)?);
        Ok(bias.addmm(m1, m2)?.addmm(m1, m2)?.into())
    });
    let inputs = vec![
        randn(&mut rng, &[2, 3], DType::F32)?.into(),
        randn(&mut rng, &[3, 4], DType::F32)?.into(),
        randn(&mut rng, &[4], DType::F32)?.into(),
    ];
    Ok(CaseSpec::graph(m, inputs))
}

fn permute2() -> MlxResult<CaseSpec> {
    let m = FuncModule::new(|args| Ok(tensor_arg(args, 0)?.permute(&[0, 1, 4, 2, 5, 3])?.into()));
    Ok(CaseSpec::graph(m, vec![tensor(&[0.0], &[1, 1, 1, 1, 1, 1])?.into()]))
}

fn pad() -> MlxResult<CaseSpec> {
    let x = tensor(&[0.0, 1.0, 1.0, 1.0, 2.0, 3.0, 7.0, 7.0], &[1, 1, 2, 4])?;
    Ok(CaseSpec::graph(ReflectionPad2d::new((3, 4, 1, 2)), vec![x.into()]))
}

fn params() -> MlxResult<CaseSpec> {
    let y = tensor(&[1.0, 2.0, 3.0, 4.0], &[2, 2])?;
    let m = FuncModule::with_params(squashed_product(), &[y])?;
    Ok(CaseSpec::graph(m, vec![tensor(&[1.0, 2.0, 3.0, 4.0], &[2, 2])?.into()]))
}

fn non_float_params() -> MlxResult<CaseSpec> {
    let y = typed(&[1.0, 2.0, 3.0, 4.0], &[2, 2], DType::I64)?;
    let m = FuncModule::with_params(
        |args| {
            let x = tensor_arg(args, 0)?;
            Ok(x.mul(&x.add(tensor_arg(args, 1)?)?)?.into())
        },
        &[y],
    )?;
    let x = typed(&[1.0, 2.0, 3.0, 4.0], &[2, 2], DType::I64)?;
    Ok(CaseSpec::graph(m, vec![x.into()]))
}

fn symbolic_mismatch() -> MlxResult<CaseSpec> {
    let mut registry = SymbolicRegistry::with_builtins();
    // Declares one parameter where the call site passes two; the arity check
    // rejects the call before this body could run.
    registry.register_custom("MyFun", &["x"], |_, _| {
        Err(ExportError::SymbolicArgument("MyFun translation invoked".into()))
    });
    let m = FuncModule::new(|args| {
        let (x, y) = (tensor_arg(args, 0)?, tensor_arg(args, 1)?);
        call_custom("MyFun", vec![x.into(), y.into()], |a| {
            Ok(a[0].as_tensor()?.add(a[1].as_tensor()?)?.into())
        })
    });
    let inputs = vec![ones(&[2, 2])?.into(), ones(&[2, 2])?.into()];
    Ok(CaseSpec::graph(m, inputs)
        .with_options(ExportOptions::default().with_registry(registry))
        .raises(ErrorCategory::Type, Some("occurred when translating MyFun")))
}

fn batchnorm() -> MlxResult<CaseSpec> {
    let bn = BatchNorm2d::new(2, &mut init::seeded(17))?;
    Ok(CaseSpec::graph(bn, vec![ones(&[2, 2])?.into()]))
}

fn batchnorm_training() -> MlxResult<CaseSpec> {
    let bn = BatchNorm2d::new(2, &mut init::seeded(17))?;
    Ok(CaseSpec::graph(bn, vec![ones(&[2, 2])?.into()])
        .with_options(ExportOptions::default().with_training(true)))
}

fn conv() -> MlxResult<CaseSpec> {
    let conv = Conv2d::new(16, 13, 3, false, &mut init::seeded(19))?;
    Ok(CaseSpec::graph(conv, vec![ones(&[20, 16, 50, 40])?.into()]))
}

fn maxpool() -> MlxResult<CaseSpec> {
    let mut rng = init::seeded(20);
    let x = randn(&mut rng, &[20, 16, 50], DType::F32)?;
    Ok(CaseSpec::graph(MaxPool1d::new(3, Some(2)), vec![x.into()]))
}

/// Instance normalization computed from primitive ops and exported as a
/// single `InstanceNormalization` node.
struct CustomInstanceNorm {
    scale: Tensor,
    shift: Tensor,
    eps: f64,
}

impl CustomInstanceNorm {
    const OP: &'static str = "CustomInstanceNorm";

    fn new(dim: usize, rng: &mut StdRng) -> MlxResult<Self> {
        let shape = Shape::new(vec![dim as i64]);
        Ok(Self {
            scale: init::uniform(rng, &shape, 0.0, 1.0)?,
            shift: init::constant(&shape, 0.0)?,
            eps: 1e-9,
        })
    }

    fn registry() -> SymbolicRegistry {
        let mut registry = SymbolicRegistry::with_builtins();
        registry.register_custom(Self::OP, &["input", "weight", "bias", "eps"], |ctx, args| {
            let inputs = [args[0].name()?, args[1].name()?, args[2].name()?];
            let eps = args[3].as_f64()? as f32;
            Ok(Sym::Value(ctx.op(
                "InstanceNormalization",
                &inputs,
                vec![attr_float("epsilon", eps)],
            )))
        });
        registry
    }

    fn run_forward(args: &[CallArg]) -> MlxResult<Value> {
        let (x, scale, shift) = (args[0].as_tensor()?, args[1].as_tensor()?, args[2].as_tensor()?);
        let eps = args[3].as_f64()?;
        let (n, c, h, w) = (x.size(0)?, x.size(1)?, x.size(2)?, x.size(3)?);

        let t = x.view(&[n, c, h * w])?;
        let mean = t.mean(2)?.view(&[n, c, 1])?;
        let centered = t.sub(&mean)?;
        // biased variance
        let var = centered.mul(&centered)?.mean(2)?.view(&[n, c, 1])?;
        let normed = centered.div(&var.add_scalar(eps)?.sqrt())?.view(&[n, c, h, w])?;
        let out = normed
            .mul(&scale.view(&[1, c, 1, 1])?)?
            .add(&shift.view(&[1, c, 1, 1])?)?;
        Ok(out.into())
    }
}

impl Module for CustomInstanceNorm {
    fn forward(&self, inputs: &[Value]) -> MlxResult<Value> {
        let x = tensor_arg(inputs, 0)?;
        let args = vec![x.into(), (&self.scale).into(), (&self.shift).into(), self.eps.into()];
        call_custom(Self::OP, args, Self::run_forward)
    }
}

fn symbolic_override() -> MlxResult<CaseSpec> {
    let mut rng = init::seeded(21);
    let norm = CustomInstanceNorm::new(10, &mut rng)?;
    let x = randn(&mut rng, &[2, 10, 32, 32], DType::F32)?;
    Ok(CaseSpec::graph(norm, vec![x.into()])
        .with_options(ExportOptions::default().with_registry(CustomInstanceNorm::registry())))
}

fn symbolic_override_nested() -> MlxResult<CaseSpec> {
    let mut registry = SymbolicRegistry::with_builtins();
    registry.register_custom("NestedSum", &["x", "y"], |ctx, args| {
        let x = args[0].name()?;
        let y = args[1].sym()?.as_tuple()?;
        let (y0, y1) = match y {
            [y0, y1] => (y0.name()?, y1.name()?),
            _ => {
                return Err(ExportError::SymbolicArgument(format!(
                    "NestedSum expects a pair, got {} values",
                    y.len()
                )));
            }
        };
        let sum = ctx.op("Sum", &[x, y0, y1], Vec::new());
        let neg_x = ctx.op("Neg", &[x], Vec::new());
        let neg_y0 = ctx.op("Neg", &[y0], Vec::new());
        Ok(Sym::Tuple(vec![
            Sym::Value(sum),
            Sym::Tuple(vec![Sym::Value(neg_x), Sym::Value(neg_y0)]),
        ]))
    });

    let m = FuncModule::new(|args| {
        let x = args.first().cloned().ok_or_else(|| {
            mlx_core::MlxError::InvalidArgument("NestedSum takes two arguments".into())
        })?;
        let y = args.get(1).cloned().ok_or_else(|| {
            mlx_core::MlxError::InvalidArgument("NestedSum takes two arguments".into())
        })?;
        call_custom("NestedSum", vec![x.into(), y.into()], |a| {
            let x = a[0].as_tensor()?;
            let y = a[1].as_value()?.as_tuple()?;
            let (y0, y1) = (y[0].as_tensor()?, y[1].as_tensor()?);
            Ok(Value::tuple([
                x.add(y0)?.add(y1)?.into(),
                Value::tuple([x.neg().into(), y0.neg().into()]),
            ]))
        })
    });
    let inputs = vec![
        tensor(&[1.0], &[1])?.into(),
        Value::tuple([tensor(&[2.0], &[1])?.into(), tensor(&[3.0], &[1])?.into()]),
    ];
    Ok(CaseSpec::graph(m, inputs).with_options(ExportOptions::default().with_registry(registry)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_catalog_names_unique() {
        let names: HashSet<_> = catalog().iter().map(|c| c.name).collect();
        assert_eq!(names.len(), catalog().len());
        assert!(find("chunk").is_some());
        assert!(find("index").is_none());
    }

    #[test]
    fn test_randn_is_seeded() {
        let a = randn(&mut init::seeded(1), &[8], DType::F32).unwrap();
        let b = randn(&mut init::seeded(1), &[8], DType::F32).unwrap();
        assert_eq!(a.to_vec_f32().unwrap(), b.to_vec_f32().unwrap());
        assert!(a.to_vec_f32().unwrap().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_instance_norm_forward_normalizes() {
        let mut rng = init::seeded(2);
        let norm = CustomInstanceNorm::new(2, &mut rng).unwrap();
        let x = randn(&mut rng, &[1, 2, 4, 4], DType::F32).unwrap();
        let out = norm.forward(&[x.into()]).unwrap();
        let out = out.as_tensor().unwrap();
        assert_eq!(out.shape().0, vec![1, 2, 4, 4]);

        // zero shift: each channel has mean zero after normalization
        let data = out.to_vec_f32().unwrap();
        for channel in data.chunks(16) {
            let mean: f32 = channel.iter().sum::<f32>() / 16.0;
            assert!(mean.abs() < 1e-4, "channel mean {mean}");
        }
    }

    #[test]
    fn test_nested_case_builds_nested_outputs() {
        let CaseSpec { module, inputs, .. } = symbolic_override_nested().unwrap();
        let out = module.forward(&inputs).unwrap();
        let leaves: Vec<f32> = out
            .flatten()
            .iter()
            .map(|t| t.to_vec_f32().unwrap()[0])
            .collect();
        assert_eq!(leaves, vec![6.0, -1.0, -2.0]);
    }
}
