use crate::schema::{Field, FieldKind, Record};

use proc_macro2::TokenStream;
use quote::quote;

pub(crate) fn record(record: &Record) -> TokenStream {
    let ident = &record.ident;
    let name = ident.to_string();

    let table = match &record.table {
        Some(table) => quote!(Some(#table)),
        None => quote!(None),
    };

    let hook_flags = hook_flags(record);
    let raw_fields: Vec<TokenStream> = record.fields.iter().map(raw_field).collect();

    let value_arms: Vec<TokenStream> = record.fields.iter().filter_map(value_arm).collect();
    let set_arms: Vec<TokenStream> = record.fields.iter().filter_map(set_arm).collect();
    let record_arms: Vec<TokenStream> = record.fields.iter().filter_map(record_arm).collect();
    let record_mut_arms: Vec<TokenStream> =
        record.fields.iter().filter_map(record_mut_arm).collect();

    let hooks_impl = if record.hooks.is_empty() {
        quote!(impl _loam::Hooks for #ident {})
    } else {
        // The type opted into hooks; its author supplies the impl.
        quote!()
    };

    quote! {
        const _: () = {
            use loam as _loam;

            #hooks_impl

            impl _loam::Record for #ident {
                fn descriptor() -> _loam::schema::RecordDescriptor {
                    _loam::schema::RecordDescriptor {
                        name: #name,
                        type_id: ::core::any::TypeId::of::<#ident>(),
                        table: #table,
                        hooks: #hook_flags,
                        fields: ::std::vec![#(#raw_fields),*],
                    }
                }

                fn value_at(&self, index: usize) -> _loam::Value {
                    match index {
                        #(#value_arms)*
                        _ => _loam::Value::Null,
                    }
                }

                fn set_at(&mut self, index: usize, value: _loam::Value) -> _loam::Result<()> {
                    match index {
                        #(#set_arms)*
                        _ => Err(_loam::Error::invalid_field(::std::format!(
                            "{} has no assignable field at offset {index}",
                            #name
                        ))),
                    }
                }

                fn record_at(&self, index: usize) -> Option<&dyn _loam::Record> {
                    match index {
                        #(#record_arms)*
                        _ => None,
                    }
                }

                fn record_at_mut(&mut self, index: usize) -> Option<&mut dyn _loam::Record> {
                    match index {
                        #(#record_mut_arms)*
                        _ => None,
                    }
                }
            }
        };
    }
}

fn hook_flags(record: &Record) -> TokenStream {
    let flags: Vec<TokenStream> = record
        .hooks
        .iter()
        .map(|hook| {
            let ident = quote::format_ident!("{hook}");
            quote!(#ident: true,)
        })
        .collect();

    quote! {
        _loam::schema::HookFlags {
            #(#flags)*
            ..::core::default::Default::default()
        }
    }
}

fn raw_field(field: &Field) -> TokenStream {
    let name = &field.name;
    let tag = &field.tag;
    let index = field.index;
    let nullable = field.nullable;
    let pointer = field.pointer;

    let kind = match &field.kind {
        FieldKind::Bool => quote!(_loam::schema::RawKind::Bool),
        FieldKind::Int(bits) => quote!(_loam::schema::RawKind::Int(#bits)),
        FieldKind::Uint(bits) => quote!(_loam::schema::RawKind::Uint(#bits)),
        FieldKind::Float(bits) => quote!(_loam::schema::RawKind::Float(#bits)),
        FieldKind::Str => quote!(_loam::schema::RawKind::Str),
        FieldKind::Bytes => quote!(_loam::schema::RawKind::Bytes),
        FieldKind::Time => quote!(_loam::schema::RawKind::Time),
        FieldKind::Serialized => quote!(_loam::schema::RawKind::Serialized),
        FieldKind::Embedded(ty) => {
            quote!(_loam::schema::RawKind::Embedded(<#ty as _loam::Record>::descriptor))
        }
        FieldKind::Relation { target, many } => quote! {
            _loam::schema::RawKind::Relation {
                descriptor: <#target as _loam::Record>::descriptor,
                many: #many,
            }
        },
    };

    quote! {
        _loam::schema::RawField {
            name: #name,
            tag: #tag,
            index: #index,
            kind: #kind,
            nullable: #nullable,
            pointer: #pointer,
        }
    }
}

fn value_arm(field: &Field) -> Option<TokenStream> {
    let ident = &field.ident;
    let index = field.index;

    match &field.kind {
        FieldKind::Serialized => Some(quote! {
            #index => _loam::Value::from_serde(&self.#ident),
        }),
        kind if kind.is_composite() => None,
        _ => Some(quote! {
            #index => _loam::Value::from(self.#ident.clone()),
        }),
    }
}

fn set_arm(field: &Field) -> Option<TokenStream> {
    let ident = &field.ident;
    let index = field.index;

    match &field.kind {
        FieldKind::Serialized => Some(quote! {
            #index => {
                match value {
                    _loam::Value::Null => {
                        self.#ident = ::core::default::Default::default();
                    }
                    value => {
                        self.#ident = value.into_serde()?;
                    }
                }
                Ok(())
            }
        }),
        kind if kind.is_composite() => None,
        _ => Some(quote! {
            #index => {
                self.#ident = _loam::schema::FromValue::from_value(value)?;
                Ok(())
            }
        }),
    }
}

fn record_arm(field: &Field) -> Option<TokenStream> {
    let ident = &field.ident;
    let index = field.index;

    match &field.kind {
        FieldKind::Embedded(_) | FieldKind::Relation { many: false, .. } => {
            if field.nullable {
                Some(quote! {
                    #index => self.#ident.as_ref().map(|v| v as &dyn _loam::Record),
                })
            } else if field.pointer {
                Some(quote! {
                    #index => Some(&*self.#ident),
                })
            } else {
                Some(quote! {
                    #index => Some(&self.#ident),
                })
            }
        }
        _ => None,
    }
}

fn record_mut_arm(field: &Field) -> Option<TokenStream> {
    let ident = &field.ident;
    let index = field.index;

    match &field.kind {
        FieldKind::Embedded(_) | FieldKind::Relation { many: false, .. } => {
            if field.nullable {
                Some(quote! {
                    #index => {
                        let value = self
                            .#ident
                            .get_or_insert_with(::core::default::Default::default);
                        Some(&mut *value as &mut dyn _loam::Record)
                    }
                })
            } else if field.pointer {
                Some(quote! {
                    #index => Some(&mut *self.#ident),
                })
            } else {
                Some(quote! {
                    #index => Some(&mut self.#ident),
                })
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quote::quote;

    #[test]
    fn expansion_contains_descriptor_and_accessors() {
        let item: syn::ItemStruct = syn::parse2(quote! {
            struct User {
                id: u64,
                name: String,
            }
        })
        .unwrap();
        let record = crate::schema::Record::from_ast(&item).unwrap();
        let output = super::record(&record).to_string();

        assert!(output.contains("impl _loam :: Record for User"));
        assert!(output.contains("fn descriptor"));
        assert!(output.contains("fn value_at"));
        assert!(output.contains("impl _loam :: Hooks for User"));
    }

    #[test]
    fn hook_opt_in_suppresses_default_hooks_impl() {
        let item: syn::ItemStruct = syn::parse2(quote! {
            #[loam(hooks(before_create))]
            struct User {
                id: u64,
            }
        })
        .unwrap();
        let record = crate::schema::Record::from_ast(&item).unwrap();
        let output = super::record(&record).to_string();

        assert!(!output.contains("impl _loam :: Hooks for User"));
        assert!(output.contains("before_create : true"));
    }
}
