//! Tracing export: run a module on example inputs and translate the recorded
//! graph into an ONNX model.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use mlx_core::graph::{Node, OpKind};
use mlx_core::custom::ArgSpec;
use mlx_core::{CustomCall, DType, MlxError, NodeId, Shape, Stream, Structure, Tensor, Value};
use mlx_nn::Module;
use prost::Message;
use tracing::debug;

use crate::error::{ExportError, Result};
use crate::proto::{
    GraphProto, ModelProto, OperatorSetIdProto, TensorShapeProto, TypeProto, ValueInfoProto,
    tensor_shape_proto, type_proto,
};
use crate::registry::{SymbolicRegistry, TranslationRule};
use crate::symbolic::{self, GraphContext, Sym, SymArg, TracedNode};
use crate::tensor_proto::{dtype_to_onnx, values_to_proto};

pub const IR_VERSION: i64 = 3;
pub const OPSET_VERSION: i64 = 6;

/// Options controlling one export.
#[derive(Clone, Debug)]
pub struct ExportOptions {
    /// Mode the module is switched into while it is traced.
    pub training: bool,
    pub registry: Arc<SymbolicRegistry>,
    pub producer_name: String,
    pub producer_version: String,
    pub graph_name: String,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            training: false,
            registry: Arc::new(SymbolicRegistry::with_builtins()),
            producer_name: "mlx-onnx".to_string(),
            producer_version: env!("CARGO_PKG_VERSION").to_string(),
            graph_name: "mlx-trace".to_string(),
        }
    }
}

impl ExportOptions {
    pub fn with_training(mut self, training: bool) -> Self {
        self.training = training;
        self
    }

    pub fn with_registry(mut self, registry: SymbolicRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }
}

/// Export `module` traced on `inputs` and encode the model.
pub fn export_to_bytes(
    module: &mut dyn Module,
    inputs: &[Value],
    opts: &ExportOptions,
) -> Result<Vec<u8>> {
    Ok(export(module, inputs, opts)?.encode_to_vec())
}

/// Export `module` traced on `inputs`.
///
/// The module runs once in `opts.training` mode; its previous mode is
/// restored whether or not the export succeeds.
pub fn export(module: &mut dyn Module, inputs: &[Value], opts: &ExportOptions) -> Result<ModelProto> {
    let was_training = module.is_training();
    module.train(opts.training);
    let traced = module.forward(inputs);
    module.train(was_training);
    let output = traced?;

    let input_leaves: Vec<Tensor> = inputs.iter().flat_map(Value::flatten).collect();
    let output_leaves = output.flatten();
    let stream = output_leaves
        .first()
        .or(input_leaves.first())
        .map(Tensor::stream)
        .ok_or_else(|| MlxError::InvalidArgument("export of a computation without tensors".into()))?;
    if input_leaves
        .iter()
        .chain(output_leaves.iter())
        .any(|t| !Arc::ptr_eq(&t.stream(), &stream))
    {
        return Err(MlxError::StreamMismatch.into());
    }

    let graph = Exporter::new(&stream, &opts.registry).run(&input_leaves, &output_leaves, &opts.graph_name)?;
    debug!(
        nodes = graph.node.len(),
        initializers = graph.initializer.len(),
        training = opts.training,
        "exported graph"
    );

    Ok(ModelProto {
        ir_version: Some(IR_VERSION),
        producer_name: Some(opts.producer_name.clone()),
        producer_version: Some(opts.producer_version.clone()),
        graph: Some(graph),
        opset_import: vec![OperatorSetIdProto {
            domain: None,
            version: Some(OPSET_VERSION),
        }],
        ..Default::default()
    })
}

/// Inputs of `node` that belong to the exported computation. The reference
/// output of a custom call is an implementation detail of evaluation.
fn traced_inputs(node: &Node) -> &[NodeId] {
    match node.op {
        OpKind::Custom { .. } => &node.inputs[..node.inputs.len().saturating_sub(1)],
        _ => &node.inputs[..],
    }
}

fn value_info(name: &str, shape: &Shape, dtype: DType) -> ValueInfoProto {
    let dim = shape
        .0
        .iter()
        .map(|&d| tensor_shape_proto::Dimension {
            value: Some(tensor_shape_proto::dimension::Value::DimValue(d)),
        })
        .collect();
    ValueInfoProto {
        name: Some(name.to_string()),
        r#type: Some(TypeProto {
            value: Some(type_proto::Value::TensorType(type_proto::Tensor {
                elem_type: Some(dtype_to_onnx(dtype) as i32),
                shape: Some(TensorShapeProto { dim }),
            })),
        }),
        ..Default::default()
    }
}

fn provenance(node: &Node) -> String {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("{} {} traced at {stamp}", node.op.name(), node.id)
}

struct Exporter<'a> {
    stream: &'a Stream,
    registry: &'a SymbolicRegistry,
    names: HashMap<NodeId, String>,
    custom_outputs: HashMap<*const CustomCall, Vec<String>>,
}

impl<'a> Exporter<'a> {
    fn new(stream: &'a Stream, registry: &'a SymbolicRegistry) -> Self {
        Self {
            stream,
            registry,
            names: HashMap::new(),
            custom_outputs: HashMap::new(),
        }
    }

    fn node(&self, id: NodeId) -> Result<Node> {
        self.stream
            .get_node(id)
            .ok_or_else(|| MlxError::InvalidArgument(format!("missing graph node {id}")).into())
    }

    fn buffer(&self, id: NodeId) -> Result<Vec<f32>> {
        self.stream
            .get_buffer(id)
            .ok_or_else(|| MlxError::InvalidArgument(format!("source node {id} has no data")).into())
    }

    fn name_of(&self, id: NodeId) -> Result<&str> {
        self.names.get(&id).map(String::as_str).ok_or_else(|| {
            ExportError::SymbolicArgument(format!("value {id} is used before it is defined"))
        })
    }

    /// Nodes reachable from `outputs` without passing through an input, in
    /// creation order.
    fn reachable(&self, outputs: &[NodeId], inputs: &HashSet<NodeId>) -> Result<Vec<Node>> {
        let mut seen = HashSet::new();
        let mut stack: Vec<NodeId> = outputs.to_vec();
        let mut nodes = Vec::new();
        while let Some(id) = stack.pop() {
            if inputs.contains(&id) || !seen.insert(id) {
                continue;
            }
            let node = self.node(id)?;
            stack.extend_from_slice(traced_inputs(&node));
            nodes.push(node);
        }
        // The graph is append-only, so creation order is a topological order.
        nodes.sort_by_key(|n| n.id);
        Ok(nodes)
    }

    fn run(mut self, inputs: &[Tensor], outputs: &[Tensor], graph_name: &str) -> Result<GraphProto> {
        let mut graph = GraphProto {
            name: Some(graph_name.to_string()),
            ..Default::default()
        };

        for (i, t) in inputs.iter().enumerate() {
            let name = i.to_string();
            graph.input.push(value_info(&name, t.shape(), t.dtype()));
            self.names.entry(t.node_id()).or_insert(name);
        }

        let input_ids: HashSet<NodeId> = inputs.iter().map(Tensor::node_id).collect();
        let output_ids: Vec<NodeId> = outputs.iter().map(Tensor::node_id).collect();
        let nodes = self.reachable(&output_ids, &input_ids)?;

        let mut next = inputs.len();
        for node in nodes.iter().filter(|n| matches!(n.op, OpKind::Parameter)) {
            let name = next.to_string();
            next += 1;
            let data = self.buffer(node.id)?;
            graph.initializer.push(values_to_proto(
                &data,
                &node.meta.shape,
                node.meta.dtype,
                Some(name.clone()),
            ));
            graph
                .input
                .push(value_info(&name, &node.meta.shape, node.meta.dtype));
            self.names.insert(node.id, name);
        }

        let mut ctx = GraphContext::new(next);
        for node in &nodes {
            ctx.set_doc_string(Some(provenance(node)));
            let name = match &node.op {
                OpKind::Parameter => continue,
                OpKind::Constant => {
                    let data = self.buffer(node.id)?;
                    symbolic::inline_constant(&mut ctx, &data, &node.meta.shape, node.meta.dtype)
                }
                OpKind::Custom { call, output } => self.translate_custom(&mut ctx, node, call, *output)?,
                op => self.translate_builtin(&mut ctx, node, op)?,
            };
            self.names.insert(node.id, name);
        }
        graph.node = ctx.into_nodes();

        for t in outputs {
            let name = self.name_of(t.node_id())?;
            graph.output.push(value_info(name, t.shape(), t.dtype()));
        }
        Ok(graph)
    }

    fn input_names(&self, ids: &[NodeId]) -> Result<Vec<String>> {
        ids.iter().map(|&id| self.name_of(id).map(str::to_string)).collect()
    }

    fn translate_builtin(&mut self, ctx: &mut GraphContext, node: &Node, op: &OpKind) -> Result<String> {
        let inputs = self.input_names(&node.inputs)?;
        let input_shapes: Vec<Shape> = node
            .inputs
            .iter()
            .map(|&id| self.node(id).map(|n| n.meta.shape))
            .collect::<Result<_>>()?;

        let shape_refs: Vec<&Shape> = input_shapes.iter().collect();
        match mlx_ops::infer_shape(op, &shape_refs) {
            Ok(shape) if shape == node.meta.shape => {}
            inferred => {
                return Err(ExportError::InconsistentTrace {
                    node: format!("{} {}", op.name(), node.id),
                    recorded: node.meta.shape.clone(),
                    inferred: match inferred {
                        Ok(shape) => shape.to_string(),
                        Err(e) => e.to_string(),
                    },
                });
            }
        }

        let registry = self.registry;
        match registry.get(op.name()) {
            Some(TranslationRule::Builtin(rule)) => rule(
                ctx,
                &TracedNode {
                    op,
                    inputs: &inputs,
                    input_shapes: &input_shapes,
                    meta: &node.meta,
                },
            ),
            Some(TranslationRule::Custom(rule)) => {
                if rule.params().len() != inputs.len() {
                    return Err(arity_error(op.name(), rule.params(), inputs.len()));
                }
                let args: Vec<SymArg> = inputs.into_iter().map(|n| SymArg::Value(Sym::Value(n))).collect();
                let out = rule.apply(ctx, &args)?;
                Ok(out.name()?.to_string())
            }
            None => Err(ExportError::UnsupportedOperator(op.name().to_string())),
        }
    }

    fn translate_custom(
        &mut self,
        ctx: &mut GraphContext,
        node: &Node,
        call: &Arc<CustomCall>,
        output: usize,
    ) -> Result<String> {
        let key = Arc::as_ptr(call);
        if let Some(outs) = self.custom_outputs.get(&key) {
            return pick_output(call.name(), outs, output);
        }

        let registry = self.registry;
        let rule = match registry.get(call.name()) {
            Some(TranslationRule::Custom(rule)) => rule,
            _ => return Err(ExportError::UnsupportedOperator(call.name().to_string())),
        };
        if rule.params().len() != call.args().len() {
            return Err(arity_error(call.name(), rule.params(), call.args().len()));
        }

        let mut leaves = self.input_names(traced_inputs(node))?.into_iter();
        let args = call
            .args()
            .iter()
            .map(|spec| match spec {
                ArgSpec::Value(structure) => unflatten_sym(structure, &mut leaves).map(SymArg::Value),
                ArgSpec::Float(v) => Ok(SymArg::Float(*v)),
                ArgSpec::Int(v) => Ok(SymArg::Int(*v)),
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(op = call.name(), args = args.len(), "applying custom symbolic");
        let outs = rule.apply(ctx, &args)?.flatten();
        let expected = call.outputs().leaf_count();
        if outs.len() != expected {
            return Err(ExportError::SymbolicOutput {
                op: call.name().to_string(),
                detail: format!("returned {} values, the call produced {expected}", outs.len()),
            });
        }
        let picked = pick_output(call.name(), &outs, output);
        self.custom_outputs.insert(key, outs);
        picked
    }
}

fn arity_error(op: &str, params: &[String], got: usize) -> ExportError {
    ExportError::SymbolicArity {
        op: op.to_string(),
        params: params.join(", "),
        expected: params.len(),
        got,
    }
}

fn pick_output(op: &str, outs: &[String], output: usize) -> Result<String> {
    outs.get(output).cloned().ok_or_else(|| ExportError::SymbolicOutput {
        op: op.to_string(),
        detail: format!("has no output {output}"),
    })
}

fn unflatten_sym(structure: &Structure, leaves: &mut impl Iterator<Item = String>) -> Result<Sym> {
    match structure {
        Structure::Leaf => leaves.next().map(Sym::Value).ok_or_else(|| {
            ExportError::SymbolicArgument("custom call has fewer tensor inputs than arguments".into())
        }),
        Structure::Tuple(items) => items
            .iter()
            .map(|s| unflatten_sym(s, leaves))
            .collect::<Result<Vec<_>>>()
            .map(Sym::Tuple),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mlx_core::call_custom;
    use mlx_nn::FuncModule;
    use mlx_nn::tensor_arg;

    fn t(data: &[f32], dims: &[i64]) -> Tensor {
        Tensor::from_f32(data, &Shape::new(dims.to_vec())).unwrap()
    }

    fn op_types(model: &ModelProto) -> Vec<String> {
        model
            .graph
            .as_ref()
            .unwrap()
            .node
            .iter()
            .map(|n| n.op_type().to_string())
            .collect()
    }

    #[test]
    fn test_export_names_inputs_then_nodes() {
        let mut m = FuncModule::new(|args| {
            let x = tensor_arg(args, 0)?;
            let y = tensor_arg(args, 1)?;
            Ok(x.add(y)?.neg().into())
        });
        let x = t(&[1.0, 2.0], &[2]);
        let y = t(&[3.0, 4.0], &[2]);
        let model = export(&mut m, &[x.into(), y.into()], &ExportOptions::default()).unwrap();
        let graph = model.graph.as_ref().unwrap();
        assert_eq!(model.ir_version, Some(IR_VERSION));
        assert_eq!(model.opset_import[0].version, Some(OPSET_VERSION));
        assert_eq!(op_types(&model), vec!["Add", "Neg"]);
        assert_eq!(graph.node[0].input, vec!["0".to_string(), "1".to_string()]);
        assert_eq!(graph.node[1].output, vec!["3".to_string()]);
        assert_eq!(graph.output[0].name(), "3");
    }

    #[test]
    fn test_parameters_become_initializers() {
        let w = t(&[1.0, 2.0], &[2]);
        let mut m = FuncModule::with_params(
            |args| Ok(tensor_arg(args, 0)?.mul(tensor_arg(args, 1)?)?.into()),
            &[w],
        )
        .unwrap();
        let model = export(&mut m, &[t(&[5.0, 6.0], &[2]).into()], &ExportOptions::default()).unwrap();
        let graph = model.graph.unwrap();
        assert_eq!(graph.initializer.len(), 1);
        assert_eq!(graph.initializer[0].name(), "1");
        assert_eq!(graph.input.len(), 2);
        assert_eq!(graph.node[0].input, vec!["0".to_string(), "1".to_string()]);
    }

    #[test]
    fn test_scalar_constant_is_inlined() {
        let mut m = FuncModule::new(|args| Ok(tensor_arg(args, 0)?.add_scalar(1.0)?.into()));
        let model = export(&mut m, &[t(&[0.0; 6], &[2, 3]).into()], &ExportOptions::default()).unwrap();
        assert_eq!(op_types(&model), vec!["Constant", "Add"]);
        let add = &model.graph.unwrap().node[1];
        assert_eq!(add.attribute[0].name(), "broadcast");
    }

    #[test]
    fn test_expand_has_no_rule() {
        let mut m = FuncModule::new(|args| {
            Ok(tensor_arg(args, 0)?
                .broadcast_to(&Shape::new(vec![2, 3]))?
                .into())
        });
        let err = export(&mut m, &[t(&[1.0, 2.0, 3.0], &[3]).into()], &ExportOptions::default())
            .unwrap_err();
        assert!(matches!(err, ExportError::UnsupportedOperator(ref op) if op == "expand"));
    }

    #[test]
    fn test_training_mode_is_restored() {
        let mut m = FuncModule::new(|args| Ok(tensor_arg(args, 0)?.neg().into()));
        m.train(false);
        let opts = ExportOptions::default().with_training(true);
        export(&mut m, &[t(&[1.0], &[1]).into()], &opts).unwrap();
        assert!(!m.is_training());
    }

    #[test]
    fn test_custom_call_arity_mismatch_skips_body() {
        let mut registry = SymbolicRegistry::with_builtins();
        registry.register_custom("Pairwise", &["x"], |_, _| {
            panic!("body must not run on an arity mismatch")
        });
        let mut m = FuncModule::new(|args| {
            call_custom(
                "Pairwise",
                vec![tensor_arg(args, 0)?.into(), tensor_arg(args, 1)?.into()],
                |a| Ok(a[0].as_tensor()?.add(a[1].as_tensor()?)?.into()),
            )
        });
        let opts = ExportOptions::default().with_registry(registry);
        let err = export(&mut m, &[t(&[1.0], &[1]).into(), t(&[2.0], &[1]).into()], &opts)
            .unwrap_err();
        assert!(matches!(err, ExportError::SymbolicArity { expected: 1, got: 2, .. }));
    }

    #[test]
    fn test_custom_call_outputs_share_one_translation() {
        let mut registry = SymbolicRegistry::with_builtins();
        registry.register_custom("NegBoth", &["x", "y"], |ctx, args| {
            let a = ctx.op("Neg", &[args[0].name()?], Vec::new());
            let b = ctx.op("Neg", &[args[1].name()?], Vec::new());
            Ok(Sym::Tuple(vec![Sym::Value(a), Sym::Value(b)]))
        });
        let mut m = FuncModule::new(|args| {
            call_custom(
                "NegBoth",
                vec![tensor_arg(args, 0)?.into(), tensor_arg(args, 1)?.into()],
                |a| Ok(Value::tuple([a[0].as_tensor()?.neg().into(), a[1].as_tensor()?.neg().into()])),
            )
        });
        let opts = ExportOptions::default().with_registry(registry);
        let model = export(&mut m, &[t(&[1.0], &[1]).into(), t(&[2.0], &[1]).into()], &opts).unwrap();
        assert_eq!(op_types(&model), vec!["Neg", "Neg"]);
        let graph = model.graph.unwrap();
        assert_eq!(graph.output.len(), 2);
        assert_eq!(graph.output[1].name(), "3");
    }

    #[test]
    fn test_unregistered_custom_call() {
        let mut m = FuncModule::new(|args| {
            call_custom("Mystery", vec![tensor_arg(args, 0)?.into()], |a| {
                Ok(a[0].as_tensor()?.neg().into())
            })
        });
        let err = export(&mut m, &[t(&[1.0], &[1]).into()], &ExportOptions::default()).unwrap_err();
        assert!(matches!(err, ExportError::UnsupportedOperator(ref op) if op == "Mystery"));
    }
}
