//! Reader/writer for the population-description grammar (spec §6):
//!
//! ```text
//! time      {fixed|free|constrained} <name> = <expr>
//! twoN      {fixed|free|constrained} <name> = <expr>
//! mixFrac   {fixed|free|constrained} <name> = <expr>
//! segment   <name>  t=<tname> twoN=<nname> [samples=<k>]
//! mix       <child> from <native> + <mname> * <introgressor>
//! derive    <child> from <parent>
//! ```
//!
//! Line-oriented, `#` begins a comment; grounded on the teacher's
//! `pedigree_parser` (a single pass dispatching on the first whitespace
//! token, no mode-switch needed here since every line is self-describing).

use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use log::debug;
use params::{ConstrainedDecl, ParamCategory, ParamDecl, ParameterStore};
use network::{LabelIndex, PopulationDag};

use crate::NetIoError;

/// The grammar's three declarable parameter categories, in file order.
/// Declaration order matters only within a category's `constrained` bucket
/// (a constrained parameter may reference an earlier constrained one); fixed
/// and free parameters from every category are all inserted before any
/// constrained parameter is evaluated, per [`ParameterStore::new`].
#[derive(Default)]
struct Declarations {
    fixed: Vec<ParamDecl>,
    free: Vec<ParamDecl>,
    constrained: Vec<ConstrainedDecl>,
}

/// Default bounds for a free/fixed scalar, keyed by category. The grammar in
/// spec §6 carries no bound syntax, so this reader applies the natural
/// per-category domain: population sizes and times are non-negative,
/// mixture fractions lie in `[0, 1]` (the latter is also separately
/// enforced by [`ParameterStore::feasible`], regardless of these bounds).
fn default_bounds(category: ParamCategory) -> (f64, f64) {
    match category {
        ParamCategory::PopSize | ParamCategory::Time => (0.0, f64::INFINITY),
        ParamCategory::MixFrac => (0.0, 1.0),
    }
}

fn category_of(keyword: &str) -> Option<ParamCategory> {
    match keyword {
        "time" => Some(ParamCategory::Time),
        "twoN" => Some(ParamCategory::PopSize),
        "mixFrac" => Some(ParamCategory::MixFrac),
        _ => None,
    }
}

/// Strip a trailing `# comment` (if any) and surrounding whitespace; `None`
/// for a blank or fully-commented line.
fn strip_comment(line: &str) -> Option<&str> {
    let code = line.split('#').next().unwrap_or("").trim();
    if code.is_empty() { None } else { Some(code) }
}

fn parse_param_decl(lineno: usize, keyword: &str, rest: &str) -> Result<(Option<ParamDecl>, Option<ParamDecl>, Option<ConstrainedDecl>), NetIoError> {
    let category = category_of(keyword).expect("caller already matched the keyword");
    let eq = rest.find('=').ok_or_else(|| NetIoError::MalformedLine(lineno, format!("expected '=' in '{rest}'")))?;
    let head = rest[..eq].trim();
    let expr_src = rest[eq + 1..].trim().to_string();
    let mut head_tokens = head.split_whitespace();
    let status = head_tokens.next().ok_or_else(|| NetIoError::MalformedLine(lineno, "missing status".to_string()))?;
    let name = head_tokens.next().ok_or_else(|| NetIoError::MalformedLine(lineno, "missing parameter name".to_string()))?.to_string();

    match status {
        "fixed" | "free" => {
            let value = expr_src.parse::<f64>()
                .map_err(|_| NetIoError::BadNumber(lineno, expr_src.clone()))?;
            let (lo, hi) = default_bounds(category);
            let decl = ParamDecl{name, value, lo, hi, category};
            if status == "fixed" { Ok((Some(decl), None, None)) } else { Ok((None, Some(decl), None)) }
        },
        "constrained" => Ok((None, None, Some(ConstrainedDecl{name, expr_src, category}))),
        "arbitrary" => Err(NetIoError::MalformedLine(lineno, "'arbitrary' parameters are not declarable from a population-description file".to_string())),
        other => Err(NetIoError::UnknownStatus(lineno, other.to_string())),
    }
}

struct SegmentDecl {
    lineno: usize,
    name: String,
    t_name: String,
    twon_name: String,
    samples: usize,
}

fn parse_segment_decl(lineno: usize, rest: &str) -> Result<SegmentDecl, NetIoError> {
    let mut tokens = rest.split_whitespace();
    let name = tokens.next().ok_or_else(|| NetIoError::MalformedLine(lineno, "missing segment name".to_string()))?.to_string();
    let mut t_name = None;
    let mut twon_name = None;
    let mut samples = 0usize;
    for token in tokens {
        let (key, value) = token.split_once('=')
            .ok_or_else(|| NetIoError::MalformedLine(lineno, format!("expected key=value, got '{token}'")))?;
        match key {
            "t" => t_name = Some(value.to_string()),
            "twoN" => twon_name = Some(value.to_string()),
            "samples" => samples = value.parse::<usize>()
                .map_err(|_| NetIoError::BadNumber(lineno, value.to_string()))?,
            other => return Err(NetIoError::MalformedLine(lineno, format!("unknown segment attribute '{other}'"))),
        }
    }
    let t_name = t_name.ok_or_else(|| NetIoError::MalformedLine(lineno, "segment is missing 't=<name>'".to_string()))?;
    let twon_name = twon_name.ok_or_else(|| NetIoError::MalformedLine(lineno, "segment is missing 'twoN=<name>'".to_string()))?;
    Ok(SegmentDecl{lineno, name, t_name, twon_name, samples})
}

enum Edge {
    Derive{lineno: usize, child: String, parent: String},
    Mix{lineno: usize, child: String, native: String, mix_name: String, introgressor: String},
}

fn parse_derive(lineno: usize, rest: &str) -> Result<Edge, NetIoError> {
    let tokens: Vec<&str> = rest.split_whitespace().collect();
    if tokens.len() != 3 || tokens[1] != "from" {
        return Err(NetIoError::MalformedLine(lineno, format!("expected '<child> from <parent>', got '{rest}'")));
    }
    Ok(Edge::Derive{lineno, child: tokens[0].to_string(), parent: tokens[2].to_string()})
}

fn parse_mix(lineno: usize, rest: &str) -> Result<Edge, NetIoError> {
    // <child> from <native> + <mname> * <introgressor>
    let tokens: Vec<&str> = rest.split_whitespace().collect();
    if tokens.len() != 7 || tokens[1] != "from" || tokens[3] != "+" || tokens[5] != "*" {
        return Err(NetIoError::MalformedLine(lineno, format!("expected '<child> from <native> + <mixFrac> * <introgressor>', got '{rest}'")));
    }
    Ok(Edge::Mix{lineno, child: tokens[0].to_string(), native: tokens[2].to_string(), mix_name: tokens[4].to_string(), introgressor: tokens[6].to_string()})
}

/// Read a population-description file into a [`ParameterStore`], a
/// [`PopulationDag`], and the [`LabelIndex`] of samples declared along the
/// way (one label per unit of `samples=<k>`, named `<segment>.<i>`).
///
/// Declaration order is significant: a `segment`, `mix`, or `derive` line may
/// only reference parameters and segments already declared above it in the
/// file — mirroring the grammar's line-oriented, single-pass nature.
///
/// # Errors
/// [`NetIoError`] on any malformed line, undeclared reference, or a
/// structural/domain failure surfaced from [`params`]/[`network`].
pub fn read_model(path: &Path) -> Result<(ParameterStore, PopulationDag, LabelIndex), NetIoError> {
    let file = File::open(path).map_err(|e| NetIoError::OpenFile(path.display().to_string(), e))?;
    let reader = BufReader::new(file);

    let mut decls = Declarations::default();
    let mut segment_decls = Vec::new();
    let mut edges = Vec::new();

    for (i, line) in reader.lines().enumerate() {
        let lineno = i + 1;
        let line = line.map_err(|e| NetIoError::OpenFile(path.display().to_string(), e))?;
        let Some(code) = strip_comment(&line) else { continue };

        let (keyword, rest) = code.split_once(char::is_whitespace)
            .ok_or_else(|| NetIoError::MalformedLine(lineno, format!("missing arguments on '{code}'")))?;
        let rest = rest.trim();

        if category_of(keyword).is_some() {
            let (fixed, free, constrained) = parse_param_decl(lineno, keyword, rest)?;
            decls.fixed.extend(fixed);
            decls.free.extend(free);
            decls.constrained.extend(constrained);
            continue;
        }

        match keyword {
            "segment" => segment_decls.push(parse_segment_decl(lineno, rest)?),
            "derive" => edges.push(parse_derive(lineno, rest)?),
            "mix" => edges.push(parse_mix(lineno, rest)?),
            other => return Err(NetIoError::UnknownKeyword(lineno, other.to_string())),
        }
    }

    let params = ParameterStore::new(&decls.fixed, &decls.free, &decls.constrained)
        .map_err(|e| NetIoError::ParamError(0, e))?;

    if segment_decls.is_empty() {
        return Err(NetIoError::EmptyNetwork);
    }

    let mut dag = PopulationDag::new();
    let mut labels = LabelIndex::new();
    for decl in &segment_decls {
        let twon = params.handle_of(&decl.twon_name)
            .ok_or_else(|| NetIoError::UnknownParameter(decl.lineno, decl.twon_name.clone()))?;
        let start = params.handle_of(&decl.t_name)
            .ok_or_else(|| NetIoError::UnknownParameter(decl.lineno, decl.t_name.clone()))?;
        let mut tips = Vec::with_capacity(decl.samples);
        for i in 0..decl.samples {
            let label = format!("{}.{i}", decl.name);
            let bit = labels.insert(&label)
                .map_err(|e| NetIoError::NetworkError(decl.lineno, e))?;
            tips.push(bit);
        }
        dag.add_segment(&decl.name, twon, start, tips)
            .map_err(|e| NetIoError::NetworkError(decl.lineno, e))?;
    }

    for edge in edges {
        match edge {
            Edge::Derive{lineno, child, parent} => {
                let child = dag.handle_of(&child).ok_or(NetIoError::UnknownSegment(lineno, child))?;
                let parent = dag.handle_of(&parent).ok_or(NetIoError::UnknownSegment(lineno, parent))?;
                dag.add_child(parent, child, &params).map_err(|e| NetIoError::NetworkError(lineno, e))?;
            },
            Edge::Mix{lineno, child, native, mix_name, introgressor} => {
                let child = dag.handle_of(&child).ok_or_else(|| NetIoError::UnknownSegment(lineno, child.clone()))?;
                let native = dag.handle_of(&native).ok_or_else(|| NetIoError::UnknownSegment(lineno, native.clone()))?;
                let introgressor = dag.handle_of(&introgressor).ok_or_else(|| NetIoError::UnknownSegment(lineno, introgressor.clone()))?;
                let mix_handle = params.handle_of(&mix_name).ok_or_else(|| NetIoError::UnknownParameter(lineno, mix_name.clone()))?;
                dag.mix(child, mix_handle, native, introgressor, &params).map_err(|e| NetIoError::NetworkError(lineno, e))?;
            },
        }
    }

    dag.feasible(&params).map_err(|e| NetIoError::NetworkError(0, e))?;

    debug!(
        "Built population network from '{}': {} segments, {} sample labels",
        path.display(), dag.len(), labels.len(),
    );
    Ok((params, dag, labels))
}

fn param_line(keyword: &str, store: &ParameterStore, category: params::ParamCategory, name: &str) -> String {
    let handle = store.handle_of(name).expect("caller only passes names it collected from this very store");
    let p = store.get(handle);
    let status = match p.status {
        params::ParamStatus::Fixed => "fixed",
        params::ParamStatus::Free => "free",
        params::ParamStatus::Constrained => "constrained",
        params::ParamStatus::Arbitrary => "arbitrary",
    };
    debug_assert_eq!(p.category, category);
    format!("{keyword}      {status} {name} = {}\n", p.value)
}

/// Write a population-description file reproducing `params`/`dag` well
/// enough to be re-read by [`read_model`] — useful for tests and for
/// `--dump-model` debugging. `constrained` parameters are emitted with their
/// *current* numeric value rather than their original expression, since
/// [`ParameterStore`] does not retain the source text once compiled.
///
/// # Errors
/// [`NetIoError::WriteFailed`] on any I/O failure.
pub fn write_model(path: &Path, params: &ParameterStore, dag: &PopulationDag) -> Result<(), NetIoError> {
    let mut out = String::new();
    let mut seen_params = std::collections::HashSet::new();
    for (_, seg) in dag.iter() {
        for (keyword, category, name) in [
            ("twoN", params::ParamCategory::PopSize, param_name(params, seg.twon)),
            ("time", params::ParamCategory::Time, param_name(params, seg.start)),
        ] {
            if seen_params.insert(name.clone()) {
                out.push_str(&param_line(keyword, params, category, &name));
            }
        }
        if let Some(m) = seg.mix_frac {
            let name = param_name(params, m);
            if seen_params.insert(name.clone()) {
                out.push_str(&param_line("mixFrac", params, params::ParamCategory::MixFrac, &name));
            }
        }
    }
    for (_, seg) in dag.iter() {
        let twon_name = param_name(params, seg.twon);
        let t_name = param_name(params, seg.start);
        let samples = seg.tips.len();
        out.push_str(&format!("segment   {} t={t_name} twoN={twon_name} samples={samples}\n", seg.name));
    }
    for (_, seg) in dag.iter() {
        match seg.parents.as_slice() {
            [] => {},
            [parent] => out.push_str(&format!("derive    {} from {}\n", seg.name, dag.get(*parent).name)),
            [native_or_intro_a, native_or_intro_b] => {
                let mix_name = param_name(params, seg.mix_frac.expect("an admixture child always carries a mixture-fraction handle"));
                // the introgressor is whichever parent edge carries the mix_frac handle, per `PopulationDag::mix`'s wiring.
                let (native, introgressor) = (*native_or_intro_a, *native_or_intro_b);
                out.push_str(&format!("mix       {} from {} + {mix_name} * {}\n", seg.name, dag.get(native).name, dag.get(introgressor).name));
            },
            _ => unreachable!("a segment never carries more than two parents"),
        }
    }
    std::fs::write(path, out).map_err(|e| NetIoError::WriteFailed(path.display().to_string(), e))
}

fn param_name(store: &ParameterStore, handle: params::ParamHandle) -> String {
    store.get(handle).name.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_tmp(contents: &str) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), contents).unwrap();
        file
    }

    #[test]
    fn reads_a_single_panmictic_segment() {
        let file = write_tmp("\
            # a trivial two-tip model\n\
            twoN fixed twoN_a = 1.0\n\
            time fixed t_a = 0.0\n\
            segment a t=t_a twoN=twoN_a samples=2\n\
        ");
        let (params, dag, labels) = read_model(file.path()).unwrap();
        assert_eq!(labels.len(), 2);
        let a = dag.handle_of("a").unwrap();
        assert_eq!(dag.get(a).tips.len(), 2);
        assert!((params.get_value(params.handle_of("twoN_a").unwrap()) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn reads_derive_and_admixture_edges() {
        let file = write_tmp("\
            twoN fixed twoN_x = 1.0\n\
            time fixed t_leaf = 0.0\n\
            time fixed t_mix = 1.0\n\
            mixFrac free m_a = 0.5\n\
            segment a t=t_leaf twoN=twoN_x samples=1\n\
            segment native t=t_mix twoN=twoN_x\n\
            segment introgressor t=t_mix twoN=twoN_x\n\
            mix a from native + m_a * introgressor\n\
            segment root t=t_mix twoN=twoN_x\n\
            derive root from native\n\
        ");
        let (_params, dag, _labels) = read_model(file.path()).unwrap();
        let a = dag.handle_of("a").unwrap();
        assert_eq!(dag.get(a).parents.len(), 2);
    }

    #[test]
    fn rejects_unknown_keyword() {
        let file = write_tmp("bogus line here\n");
        let err = read_model(file.path()).unwrap_err();
        assert!(matches!(err, NetIoError::UnknownKeyword(1, _)));
    }

    #[test]
    fn rejects_segment_with_undeclared_time_parameter() {
        let file = write_tmp("\
            twoN fixed twoN_a = 1.0\n\
            segment a t=ghost twoN=twoN_a samples=1\n\
        ");
        let err = read_model(file.path()).unwrap_err();
        assert!(matches!(err, NetIoError::UnknownParameter(2, _)));
    }

    #[test]
    fn model_round_trips_through_write_and_read() {
        let file = write_tmp("\
            twoN fixed twoN_a = 1.0\n\
            time fixed t_a = 0.0\n\
            segment a t=t_a twoN=twoN_a samples=2\n\
        ");
        let (params, dag, labels) = read_model(file.path()).unwrap();
        let written = tempfile::NamedTempFile::new().unwrap();
        write_model(written.path(), &params, &dag).unwrap();
        let (params2, dag2, labels2) = read_model(written.path()).unwrap();
        assert_eq!(labels.len(), labels2.len());
        assert_eq!(dag.len(), dag2.len());
        assert!((params.get_free()[..]).iter().zip(params2.get_free()).all(|(a, b)| (a - b).abs() < 1e-9));
    }
}
