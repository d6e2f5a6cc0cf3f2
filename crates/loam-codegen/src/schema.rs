use syn::spanned::Spanned;

/// The parsed shape of a `#[derive(Record)]` struct.
pub(crate) struct Record {
    pub(crate) ident: syn::Ident,
    pub(crate) table: Option<String>,
    pub(crate) hooks: Vec<String>,
    pub(crate) fields: Vec<Field>,
}

pub(crate) struct Field {
    pub(crate) ident: syn::Ident,
    /// Record-level field name as the schema sees it (UpperCamel, so the
    /// `CreatedAt`/`UpdatedAt` heuristics apply as specified).
    pub(crate) name: String,
    pub(crate) tag: String,
    pub(crate) index: usize,
    pub(crate) kind: FieldKind,
    pub(crate) nullable: bool,
    pub(crate) pointer: bool,
}

pub(crate) enum FieldKind {
    Bool,
    Int(u8),
    Uint(u8),
    Float(u8),
    Str,
    Bytes,
    Time,
    Serialized,
    Embedded(syn::Type),
    Relation { target: syn::Type, many: bool },
}

impl FieldKind {
    pub(crate) fn is_composite(&self) -> bool {
        matches!(self, Self::Embedded(_) | Self::Relation { .. })
    }
}

const HOOK_NAMES: &[&str] = &[
    "before_create",
    "after_create",
    "before_update",
    "after_update",
    "before_save",
    "after_save",
    "before_delete",
    "after_delete",
    "after_find",
];

impl Record {
    pub(crate) fn from_ast(item: &syn::ItemStruct) -> syn::Result<Self> {
        let syn::Fields::Named(named) = &item.fields else {
            return Err(syn::Error::new_spanned(
                item,
                "record types must have named fields",
            ));
        };

        let mut table = None;
        let mut hooks = Vec::new();

        for attr in &item.attrs {
            if !attr.path().is_ident("loam") {
                continue;
            }

            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("table") {
                    let value: syn::LitStr = meta.value()?.parse()?;
                    table = Some(value.value());
                    return Ok(());
                }

                if meta.path.is_ident("hooks") {
                    meta.parse_nested_meta(|hook| {
                        let name = hook
                            .path
                            .get_ident()
                            .map(ToString::to_string)
                            .unwrap_or_default();
                        if !HOOK_NAMES.contains(&name.as_str()) {
                            return Err(hook.error(format!("unknown hook `{name}`")));
                        }
                        hooks.push(name);
                        Ok(())
                    })?;
                    return Ok(());
                }

                Err(meta.error("expected `table = \"...\"` or `hooks(...)`"))
            })?;
        }

        let mut fields = Vec::with_capacity(named.named.len());
        for (index, field) in named.named.iter().enumerate() {
            fields.push(Field::from_ast(field, index)?);
        }

        Ok(Self {
            ident: item.ident.clone(),
            table,
            hooks,
            fields,
        })
    }
}

impl Field {
    fn from_ast(field: &syn::Field, index: usize) -> syn::Result<Self> {
        let ident = field
            .ident
            .clone()
            .expect("named struct fields have identifiers");

        let mut tag = String::new();
        for attr in &field.attrs {
            if !attr.path().is_ident("loam") {
                continue;
            }
            let literal: syn::LitStr = attr.parse_args()?;
            if !tag.is_empty() {
                tag.push(';');
            }
            tag.push_str(&literal.value());
        }

        let shape = TypeShape::of(&field.ty);
        let kind = classify(&shape, &tag, field.ty.span())?;

        Ok(Self {
            name: upper_camel(&ident.to_string()),
            ident,
            tag,
            index,
            kind,
            nullable: shape.nullable,
            pointer: shape.pointer,
        })
    }
}

/// Unwrapped view of a field type: `Option`/`Box` peeled off, `Vec`
/// detected, the terminal type kept.
pub(crate) struct TypeShape {
    pub(crate) terminal: syn::Type,
    pub(crate) nullable: bool,
    pub(crate) pointer: bool,
    pub(crate) many: bool,
}

impl TypeShape {
    fn of(ty: &syn::Type) -> Self {
        let mut nullable = false;
        let mut pointer = false;
        let mut many = false;
        let mut current = ty.clone();

        loop {
            if let Some(inner) = generic_arg(&current, "Option") {
                nullable = true;
                pointer = true;
                current = inner;
                continue;
            }
            if let Some(inner) = generic_arg(&current, "Box") {
                pointer = true;
                current = inner;
                continue;
            }
            if let Some(inner) = generic_arg(&current, "Vec") {
                if path_is(&inner, "u8") {
                    // Vec<u8> is a scalar byte string
                    break;
                }
                many = true;
                current = inner;
                continue;
            }
            break;
        }

        Self {
            terminal: current,
            nullable,
            pointer,
            many,
        }
    }
}

fn classify(shape: &TypeShape, tag: &str, span: proc_macro2::Span) -> syn::Result<FieldKind> {
    let tag_lower = tag.to_lowercase();
    let tag_has = |key: &str| {
        tag_lower
            .split(';')
            .any(|part| part.trim().split('=').next().map(str::trim) == Some(key))
    };

    if shape.many {
        return Ok(FieldKind::Relation {
            target: shape.terminal.clone(),
            many: true,
        });
    }

    if let Some(primitive) = primitive_kind(&shape.terminal) {
        return Ok(primitive);
    }

    if tag_has("embedded") {
        return Ok(FieldKind::Embedded(shape.terminal.clone()));
    }

    if tag_has("serializer") || tag_has("json") {
        return Ok(FieldKind::Serialized);
    }

    // A bare record-typed field: a relation to infer by convention.
    if matches!(&shape.terminal, syn::Type::Path(_)) {
        return Ok(FieldKind::Relation {
            target: shape.terminal.clone(),
            many: false,
        });
    }

    Err(syn::Error::new(
        span,
        "unsupported field type; annotate with `serializer=` or `embedded`",
    ))
}

fn primitive_kind(ty: &syn::Type) -> Option<FieldKind> {
    let syn::Type::Path(path) = ty else {
        return None;
    };
    let last = path.path.segments.last()?;
    let name = last.ident.to_string();

    Some(match name.as_str() {
        "bool" => FieldKind::Bool,
        "i8" => FieldKind::Int(8),
        "i16" => FieldKind::Int(16),
        "i32" => FieldKind::Int(32),
        "i64" | "isize" => FieldKind::Int(64),
        "u8" => FieldKind::Uint(8),
        "u16" => FieldKind::Uint(16),
        "u32" => FieldKind::Uint(32),
        "u64" | "usize" => FieldKind::Uint(64),
        "f32" => FieldKind::Float(32),
        "f64" => FieldKind::Float(64),
        "String" => FieldKind::Str,
        "DateTime" | "NaiveDateTime" => FieldKind::Time,
        "Vec" => {
            // only Vec<u8> survives TypeShape unwrapping
            FieldKind::Bytes
        }
        _ => return None,
    })
}

fn generic_arg(ty: &syn::Type, wrapper: &str) -> Option<syn::Type> {
    let syn::Type::Path(path) = ty else {
        return None;
    };
    let last = path.path.segments.last()?;
    if last.ident != wrapper {
        return None;
    }
    let syn::PathArguments::AngleBracketed(args) = &last.arguments else {
        return None;
    };
    args.args.iter().find_map(|arg| match arg {
        syn::GenericArgument::Type(inner) => Some(inner.clone()),
        _ => None,
    })
}

fn path_is(ty: &syn::Type, name: &str) -> bool {
    matches!(ty, syn::Type::Path(path) if path.path.is_ident(name))
}

/// `created_at` -> `CreatedAt`, matching the record-level names the
/// introspector's heuristics expect.
fn upper_camel(name: &str) -> String {
    name.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}
