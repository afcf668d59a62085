//! Shared fixtures for engine tests.

use arca_registry::{Attachment, InMemoryRegistry, Instance};
use arca_types::{FieldDescriptor, ModelId, PrimaryKey, ValueKind};

pub(crate) fn model(name: &str) -> ModelId {
    ModelId::new(name).unwrap()
}

/// Frameworks, controls that belong to a framework, and applied controls
/// that implement a control.
pub(crate) fn grc_registry() -> InMemoryRegistry {
    let registry = InMemoryRegistry::new();
    registry.register_model(
        model("core.framework"),
        vec![
            FieldDescriptor::scalar("name", ValueKind::Text),
            FieldDescriptor::scalar("weight", ValueKind::Decimal).nullable(),
        ],
    );
    registry.register_model(
        model("core.control"),
        vec![
            FieldDescriptor::scalar("name", ValueKind::Text),
            FieldDescriptor::single_ref("framework", model("core.framework")),
            FieldDescriptor::single_ref("parent", model("core.control")).nullable(),
            FieldDescriptor::many_to_many("mapped_frameworks", model("core.framework")),
        ],
    );
    registry.register_model(
        model("core.applied"),
        vec![
            FieldDescriptor::scalar("name", ValueKind::Text),
            FieldDescriptor::single_ref("control", model("core.control")).nullable(),
            FieldDescriptor::array_ref("covers", model("core.control")),
            FieldDescriptor::attachment("evidence"),
        ],
    );
    registry
}

/// Primary keys of the records created by [`seed_chain`].
pub(crate) struct Chain {
    pub framework: PrimaryKey,
    pub control: PrimaryKey,
    pub applied: PrimaryKey,
}

/// Seed one framework, one control in it and one applied control
/// implementing that control, with an evidence attachment.
pub(crate) fn seed_chain(registry: &InMemoryRegistry) -> Chain {
    let chain = Chain {
        framework: PrimaryKey::generate(),
        control: PrimaryKey::generate(),
        applied: PrimaryKey::generate(),
    };
    registry
        .insert(
            &model("core.framework"),
            Instance::new(chain.framework).with_scalar("name", "ISO 27001"),
        )
        .unwrap();
    registry
        .insert(
            &model("core.control"),
            Instance::new(chain.control)
                .with_scalar("name", "A.5.1")
                .with_ref("framework", Some(chain.framework))
                .with_ref("parent", None)
                .with_refs("mapped_frameworks", vec![chain.framework]),
        )
        .unwrap();
    registry
        .insert(
            &model("core.applied"),
            Instance::new(chain.applied)
                .with_scalar("name", "Access policy")
                .with_ref("control", Some(chain.control))
                .with_refs("covers", vec![chain.control])
                .with_attachment("evidence", Attachment::new("policy.pdf", b"%PDF-1.7".to_vec())),
        )
        .unwrap();
    chain
}
