//! Intrinsic-function evaluation over template value trees.
//!
//! A JSON tree is first lowered into an [`Expr`]: single-key mappings whose
//! key names an intrinsic (`Ref`, `Join`, `FindInMap`, `GetAtt`) become
//! function nodes, everything else stays structural. Evaluation is bottom-up
//! and a pure function of the [`ResolutionContext`].

use super::error::{EvalError, StackError};
use super::namer::ResourceNamer;
use super::types::*;
use indexmap::IndexMap;
use serde_json::Value;
use tracing::debug;

/// Per-stack data needed to resolve references.
#[derive(Debug, Clone)]
pub struct ResolutionContext {
    template: Template,
    parameters: IndexMap<String, String>,
    namer: ResourceNamer,
    region: String,
    max_depth: usize,
}

impl ResolutionContext {
    pub fn new(
        template: Template,
        parameters: IndexMap<String, String>,
        namer: ResourceNamer,
        region: &str,
        max_depth: usize,
    ) -> Self {
        Self {
            template,
            parameters,
            namer,
            region: region.to_string(),
            max_depth,
        }
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn namer(&self) -> &ResourceNamer {
        &self.namer
    }

    /// Resolve a `Ref` target: parameter, then resource, then region.
    pub fn resolve_ref(&self, name: &str) -> Result<String, EvalError> {
        if self.template.parameters.contains_key(name) {
            return self
                .parameters
                .get(name)
                .cloned()
                .ok_or_else(|| EvalError::ParameterNotSet(name.to_string()));
        }
        if self.template.resources.contains_key(name) {
            return Ok(self.namer.name_for(name));
        }
        if name == REGION_PSEUDO_PARAMETER {
            return Ok(self.region.clone());
        }
        Err(EvalError::UnresolvableReference(name.to_string()))
    }

    /// Strict three-level lookup in the `mappings` section.
    pub fn find_in_map(&self, map: &str, top_key: &str, key: &str) -> Result<Value, EvalError> {
        let mappings = self
            .template
            .mappings
            .as_ref()
            .ok_or_else(|| EvalError::NoMappings(map.to_string()))?;
        let maps = mappings.as_object().ok_or_else(|| EvalError::NotAMapping {
            path: "mappings".to_string(),
        })?;
        let entry = maps
            .get(map)
            .ok_or_else(|| EvalError::UnknownMap(map.to_string()))?
            .as_object()
            .ok_or_else(|| EvalError::NotAMapping {
                path: map.to_string(),
            })?;
        let level = entry
            .get(top_key)
            .ok_or_else(|| EvalError::UnknownTopKey {
                map: map.to_string(),
                key: top_key.to_string(),
            })?
            .as_object()
            .ok_or_else(|| EvalError::NotAMapping {
                path: format!("{}/{}", map, top_key),
            })?;
        level
            .get(key)
            .cloned()
            .ok_or_else(|| EvalError::UnknownSecondKey {
                map: map.to_string(),
                top_key: top_key.to_string(),
                key: key.to_string(),
            })
    }
}

/// Lowered template expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// String or other scalar; evaluates to itself
    Literal(Value),
    Sequence(Vec<Expr>),
    /// Plain mapping, including one-key mappings with a non-function key
    Mapping(IndexMap<String, Expr>),
    Ref(Box<Expr>),
    Join {
        delimiter: Box<Expr>,
        items: Box<Expr>,
    },
    FindInMap {
        map: Box<Expr>,
        top_key: Box<Expr>,
        key: Box<Expr>,
    },
    GetAtt(Box<Expr>),
}

impl Expr {
    /// Lower a JSON tree, failing if it nests deeper than `max_depth`.
    pub fn parse(value: &Value, max_depth: usize) -> Result<Self, EvalError> {
        parse_at(value, 0, max_depth)
    }

    pub fn eval(&self, ctx: &ResolutionContext) -> Result<Value, EvalError> {
        match self {
            Self::Literal(v) => Ok(v.clone()),
            Self::Sequence(items) => items
                .iter()
                .map(|e| e.eval(ctx))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Self::Mapping(entries) => {
                let mut out = serde_json::Map::new();
                for (key, value) in entries {
                    out.insert(key.clone(), value.eval(ctx)?);
                }
                Ok(Value::Object(out))
            }
            Self::Ref(arg) => {
                let name = expect_string("Ref", arg.eval(ctx)?)?;
                let result = ctx.resolve_ref(&name)?;
                debug!(name = %name, result = %result, "Ref");
                Ok(Value::String(result))
            }
            Self::Join { delimiter, items } => {
                let delimiter = expect_string("Join", delimiter.eval(ctx)?)?;
                let items = match items.eval(ctx)? {
                    Value::Array(items) => items,
                    other => {
                        return Err(EvalError::MalformedArguments {
                            function: "Join",
                            detail: format!(
                                "second argument must be a sequence, got {}",
                                value_kind(&other)
                            ),
                        })
                    }
                };
                let parts = items
                    .into_iter()
                    .map(|v| expect_string("Join", v))
                    .collect::<Result<Vec<_>, _>>()?;
                let result = parts.join(&delimiter);
                debug!(delimiter = %delimiter, result = %result, "Join");
                Ok(Value::String(result))
            }
            Self::FindInMap { map, top_key, key } => {
                let map = expect_string("FindInMap", map.eval(ctx)?)?;
                let top_key = expect_string("FindInMap", top_key.eval(ctx)?)?;
                let key = expect_string("FindInMap", key.eval(ctx)?)?;
                let result = ctx.find_in_map(&map, &top_key, &key)?;
                debug!(map = %map, top_key = %top_key, key = %key, result = %result, "FindInMap");
                Ok(result)
            }
            Self::GetAtt(_) => Err(EvalError::NotImplemented("GetAtt")),
        }
    }
}

fn parse_at(value: &Value, depth: usize, max_depth: usize) -> Result<Expr, EvalError> {
    if depth > max_depth {
        return Err(EvalError::DepthExceeded(max_depth));
    }
    match value {
        Value::Array(items) => items
            .iter()
            .map(|v| parse_at(v, depth + 1, max_depth))
            .collect::<Result<Vec<_>, _>>()
            .map(Expr::Sequence),
        Value::Object(map) => match map.iter().next() {
            Some((key, arg)) if map.len() == 1 => parse_function(key, arg, depth, max_depth),
            _ => {
                let mut entries = IndexMap::with_capacity(map.len());
                for (key, v) in map {
                    entries.insert(key.clone(), parse_at(v, depth + 1, max_depth)?);
                }
                Ok(Expr::Mapping(entries))
            }
        },
        scalar => Ok(Expr::Literal(scalar.clone())),
    }
}

fn parse_function(key: &str, arg: &Value, depth: usize, max_depth: usize) -> Result<Expr, EvalError> {
    let child = |v: &Value| parse_at(v, depth + 1, max_depth).map(Box::new);
    match key {
        "Ref" => Ok(Expr::Ref(child(arg)?)),
        "Join" => match arg.as_array() {
            Some(args) if args.len() >= 2 => Ok(Expr::Join {
                delimiter: child(&args[0])?,
                items: child(&args[1])?,
            }),
            _ => Err(EvalError::MalformedArguments {
                function: "Join",
                detail: format!("expected [delimiter, [items...]], got {}", arg),
            }),
        },
        "FindInMap" => match arg.as_array().map(Vec::as_slice) {
            Some([map, top_key, key]) => Ok(Expr::FindInMap {
                map: child(map)?,
                top_key: child(top_key)?,
                key: child(key)?,
            }),
            _ => Err(EvalError::MalformedArguments {
                function: "FindInMap",
                detail: format!("expected [map, top-key, key], got {}", arg),
            }),
        },
        "GetAtt" => Ok(Expr::GetAtt(child(arg)?)),
        _ => {
            let mut entries = IndexMap::with_capacity(1);
            entries.insert(key.to_string(), parse_at(arg, depth + 1, max_depth)?);
            Ok(Expr::Mapping(entries))
        }
    }
}

fn expect_string(function: &'static str, value: Value) -> Result<String, EvalError> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(EvalError::NonStringArgument {
            function,
            found: value_kind(&other).to_string(),
        }),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}

/// Evaluate a value tree against a resolution context.
pub fn evaluate(ctx: &ResolutionContext, node: &Value) -> Result<Value, EvalError> {
    Expr::parse(node, ctx.max_depth)?.eval(ctx)
}

/// Evaluate one declared resource and check its shape.
pub fn resolve_resource(
    ctx: &ResolutionContext,
    logical_id: &str,
    declaration: &Value,
) -> Result<ResolvedResource, StackError> {
    let evaluated = evaluate(ctx, declaration).map_err(|e| StackError::eval(logical_id, e))?;
    debug!(resource = %logical_id, result = %evaluated, "evaluated resource");

    let Value::Object(mut body) = evaluated else {
        return Err(StackError::TemplateInvalid(format!(
            "resource '{}' must evaluate to a mapping",
            logical_id
        )));
    };
    let resource_type = match body.remove("type") {
        Some(Value::String(t)) => t,
        _ => {
            return Err(StackError::TemplateInvalid(format!(
                "resource '{}' has no string 'type'",
                logical_id
            )))
        }
    };
    let properties = match body.remove("properties") {
        None => serde_json::Map::new(),
        Some(Value::Object(p)) => p,
        Some(other) => {
            return Err(StackError::TemplateInvalid(format!(
                "resource '{}' properties must be a mapping, got {}",
                logical_id,
                value_kind(&other)
            )))
        }
    };

    Ok(ResolvedResource {
        logical_id: logical_id.to_string(),
        name: ctx.namer().name_for(logical_id),
        resource_type,
        properties,
    })
}

/// Evaluate every declared resource in document order.
pub fn resolve_all(ctx: &ResolutionContext) -> Result<Vec<ResolvedResource>, StackError> {
    ctx.template()
        .resources
        .iter()
        .map(|(id, decl)| resolve_resource(ctx, id, decl))
        .collect()
}
