//! Canonical text rendering of models.
//!
//! Output follows the protobuf text format: fields in field-number order, one
//! per line, nested messages in braces indented by two spaces, enum values by
//! name, floats as C `%.15g` and bytes with C escapes. Two models that encode
//! the same message render to the same string.

use std::fmt::Write;

use crate::proto::{
    AttributeProto, GraphProto, ModelProto, NodeProto, OperatorSetIdProto, TensorProto,
    TensorShapeProto, TypeProto, ValueInfoProto, tensor_shape_proto, type_proto,
};

/// Clear every `doc_string` in the model, nested graphs included.
pub fn strip_doc_strings(model: &mut ModelProto) {
    model.doc_string = None;
    if let Some(graph) = model.graph.as_mut() {
        strip_graph(graph);
    }
}

fn strip_graph(graph: &mut GraphProto) {
    graph.doc_string = None;
    for node in &mut graph.node {
        node.doc_string = None;
        for attr in &mut node.attribute {
            strip_attribute(attr);
        }
    }
    for t in &mut graph.initializer {
        t.doc_string = None;
    }
    for info in graph
        .input
        .iter_mut()
        .chain(graph.output.iter_mut())
        .chain(graph.value_info.iter_mut())
    {
        info.doc_string = None;
    }
}

fn strip_attribute(attr: &mut AttributeProto) {
    attr.doc_string = None;
    if let Some(t) = attr.t.as_mut() {
        t.doc_string = None;
    }
    for t in &mut attr.tensors {
        t.doc_string = None;
    }
    if let Some(g) = attr.g.as_mut() {
        strip_graph(g);
    }
    for g in &mut attr.graphs {
        strip_graph(g);
    }
}

/// Format `x` the way C's `printf("%.15g", x)` does.
pub fn format_g15(x: f64) -> String {
    const PRECISION: i32 = 15;
    if x.is_nan() {
        return "nan".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if x == 0.0 {
        return if x.is_sign_negative() { "-0" } else { "0" }.to_string();
    }

    // The exponent after rounding to PRECISION significant digits decides
    // between fixed and scientific notation.
    let sci = format!("{:.*e}", (PRECISION - 1) as usize, x);
    let (mantissa, exp) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);

    if (-4..PRECISION).contains(&exp) {
        let decimals = (PRECISION - 1 - exp) as usize;
        trim_fraction(&format!("{x:.decimals$}")).to_string()
    } else {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{sign}{:02}", trim_fraction(mantissa), exp.abs())
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

/// Escape bytes the way the protobuf text format does.
pub fn c_escape(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        match b {
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            b'"' => out.push_str("\\\""),
            b'\'' => out.push_str("\\'"),
            b'\\' => out.push_str("\\\\"),
            0x20..=0x7e => out.push(b as char),
            _ => {
                let _ = write!(out, "\\{b:03o}");
            }
        }
    }
    out
}

struct TextWriter {
    out: String,
    depth: usize,
}

impl TextWriter {
    fn line(&mut self, name: &str, value: impl std::fmt::Display) {
        let _ = writeln!(self.out, "{:indent$}{name}: {value}", "", indent = self.depth * 2);
    }

    fn bytes(&mut self, name: &str, value: &[u8]) {
        self.line(name, format_args!("\"{}\"", c_escape(value)));
    }

    fn string(&mut self, name: &str, value: &Option<String>) {
        if let Some(v) = value {
            self.bytes(name, v.as_bytes());
        }
    }

    fn float(&mut self, name: &str, value: f32) {
        self.line(name, format_g15(f64::from(value)));
    }

    fn message(&mut self, name: &str, body: impl FnOnce(&mut Self)) {
        let _ = writeln!(self.out, "{:indent$}{name} {{", "", indent = self.depth * 2);
        self.depth += 1;
        body(self);
        self.depth -= 1;
        let _ = writeln!(self.out, "{:indent$}}}", "", indent = self.depth * 2);
    }

    fn model(&mut self, m: &ModelProto) {
        if let Some(v) = m.ir_version {
            self.line("ir_version", v);
        }
        self.string("producer_name", &m.producer_name);
        self.string("producer_version", &m.producer_version);
        self.string("domain", &m.domain);
        if let Some(v) = m.model_version {
            self.line("model_version", v);
        }
        self.string("doc_string", &m.doc_string);
        if let Some(g) = &m.graph {
            self.message("graph", |w| w.graph(g));
        }
        for o in &m.opset_import {
            self.message("opset_import", |w| w.opset(o));
        }
    }

    fn graph(&mut self, g: &GraphProto) {
        for n in &g.node {
            self.message("node", |w| w.node(n));
        }
        self.string("name", &g.name);
        for t in &g.initializer {
            self.message("initializer", |w| w.tensor(t));
        }
        self.string("doc_string", &g.doc_string);
        for i in &g.input {
            self.message("input", |w| w.value_info(i));
        }
        for o in &g.output {
            self.message("output", |w| w.value_info(o));
        }
        for v in &g.value_info {
            self.message("value_info", |w| w.value_info(v));
        }
    }

    fn node(&mut self, n: &NodeProto) {
        for i in &n.input {
            self.bytes("input", i.as_bytes());
        }
        for o in &n.output {
            self.bytes("output", o.as_bytes());
        }
        self.string("name", &n.name);
        self.string("op_type", &n.op_type);
        for a in &n.attribute {
            self.message("attribute", |w| w.attribute(a));
        }
        self.string("doc_string", &n.doc_string);
        self.string("domain", &n.domain);
    }

    fn attribute(&mut self, a: &AttributeProto) {
        self.string("name", &a.name);
        if let Some(f) = a.f {
            self.float("f", f);
        }
        if let Some(i) = a.i {
            self.line("i", i);
        }
        if let Some(s) = &a.s {
            self.bytes("s", s);
        }
        if let Some(t) = &a.t {
            self.message("t", |w| w.tensor(t));
        }
        if let Some(g) = &a.g {
            self.message("g", |w| w.graph(g));
        }
        for &f in &a.floats {
            self.float("floats", f);
        }
        for i in &a.ints {
            self.line("ints", i);
        }
        for s in &a.strings {
            self.bytes("strings", s);
        }
        for t in &a.tensors {
            self.message("tensors", |w| w.tensor(t));
        }
        for g in &a.graphs {
            self.message("graphs", |w| w.graph(g));
        }
        self.string("doc_string", &a.doc_string);
        if a.r#type.is_some() {
            self.line("type", a.r#type().text_name());
        }
    }

    fn tensor(&mut self, t: &TensorProto) {
        for d in &t.dims {
            self.line("dims", d);
        }
        if let Some(v) = t.data_type {
            self.line("data_type", v);
        }
        for &f in &t.float_data {
            self.float("float_data", f);
        }
        for v in &t.int32_data {
            self.line("int32_data", v);
        }
        for s in &t.string_data {
            self.bytes("string_data", s);
        }
        for v in &t.int64_data {
            self.line("int64_data", v);
        }
        self.string("name", &t.name);
        if let Some(raw) = &t.raw_data {
            self.bytes("raw_data", raw);
        }
        for &d in &t.double_data {
            self.line("double_data", format_g15(d));
        }
        self.string("doc_string", &t.doc_string);
    }

    fn value_info(&mut self, v: &ValueInfoProto) {
        self.string("name", &v.name);
        if let Some(t) = &v.r#type {
            self.message("type", |w| w.type_proto(t));
        }
        self.string("doc_string", &v.doc_string);
    }

    fn type_proto(&mut self, t: &TypeProto) {
        let Some(type_proto::Value::TensorType(tt)) = &t.value else {
            return;
        };
        self.message("tensor_type", |w| {
            if let Some(e) = tt.elem_type {
                w.line("elem_type", e);
            }
            if let Some(s) = &tt.shape {
                w.message("shape", |w| w.shape(s));
            }
        });
    }

    fn shape(&mut self, s: &TensorShapeProto) {
        for d in &s.dim {
            self.message("dim", |w| match &d.value {
                Some(tensor_shape_proto::dimension::Value::DimValue(v)) => w.line("dim_value", v),
                Some(tensor_shape_proto::dimension::Value::DimParam(p)) => w.bytes("dim_param", p.as_bytes()),
                None => {}
            });
        }
    }

    fn opset(&mut self, o: &OperatorSetIdProto) {
        self.string("domain", &o.domain);
        if let Some(v) = o.version {
            self.line("version", v);
        }
    }
}

/// Render `model` as canonical protobuf text.
pub fn render_model(model: &ModelProto) -> String {
    let mut w = TextWriter {
        out: String::new(),
        depth: 0,
    };
    w.model(model);
    w.out
}
