//! Built-in primitive translators.
//!
//! Elementwise primitives go through [`MappedTranslator`]; primitives that need more
//! than one tasklet, a plain copy or new states implement [`PrimitiveTranslator`]
//! directly.

mod arithmetic;
mod broadcast_in_dim;
mod concatenate;
mod conditions;
mod convert_element_type;
mod copy;
mod gather;
mod iota;
mod pjit;
mod reshape;
mod select_n;
mod slicing;
mod squeeze;

use std::sync::Arc;

use super::{MappedTranslator, PrimitiveTranslator, PrimitiveTranslatorRegistry};

pub use arithmetic::{ArithmeticOperation, LogicalOperation, ARITHMETIC_TEMPLATES, LOGICAL_TEMPLATES};
pub use broadcast_in_dim::BroadcastInDim;
pub use concatenate::ConcatenateTranslator;
pub use conditions::CondTranslator;
pub use convert_element_type::ConvertElementType;
pub use copy::{Copy, DevicePut};
pub use gather::GatherTranslator;
pub use iota::Iota;
pub use pjit::PjitTranslator;
pub use reshape::ReshapeTranslator;
pub use select_n::SelectN;
pub use slicing::{DynamicSliceTranslator, Slice};
pub use squeeze::Squeeze;

/// Every translator shipped with the crate.
pub fn builtin_translators() -> Vec<Arc<dyn PrimitiveTranslator>> {
    let mut translators: Vec<Arc<dyn PrimitiveTranslator>> = Vec::new();
    for &(name, template) in ARITHMETIC_TEMPLATES {
        translators.push(Arc::new(MappedTranslator(ArithmeticOperation::new(
            name, template,
        ))));
    }
    for &(name, bitwise, logical) in LOGICAL_TEMPLATES {
        translators.push(Arc::new(MappedTranslator(LogicalOperation::new(
            name, bitwise, logical,
        ))));
    }
    translators.push(Arc::new(MappedTranslator(BroadcastInDim)));
    translators.push(Arc::new(MappedTranslator(ConvertElementType)));
    translators.push(Arc::new(MappedTranslator(Copy)));
    translators.push(Arc::new(MappedTranslator(DevicePut)));
    translators.push(Arc::new(MappedTranslator(Iota)));
    translators.push(Arc::new(MappedTranslator(SelectN)));
    translators.push(Arc::new(MappedTranslator(Slice)));
    translators.push(Arc::new(MappedTranslator(Squeeze)));
    translators.push(Arc::new(ConcatenateTranslator));
    translators.push(Arc::new(CondTranslator));
    translators.push(Arc::new(DynamicSliceTranslator));
    translators.push(Arc::new(GatherTranslator));
    translators.push(Arc::new(PjitTranslator));
    translators.push(Arc::new(ReshapeTranslator));
    translators
}

pub(crate) fn register_builtin_translators(registry: &mut PrimitiveTranslatorRegistry) {
    for translator in builtin_translators() {
        registry
            .register(translator, true)
            .expect("overwriting registration never fails");
    }
}
