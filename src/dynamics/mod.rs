//! Bodies, fixtures, contacts, joints and the world that steps them.

pub mod arena;
pub mod body;
pub mod contact;
mod contact_manager;
mod contact_solver;
pub mod fixture;
mod island;
pub mod joints;
pub mod time_step;
pub mod world;
pub mod world_callbacks;

pub use arena::{BodyHandle, ContactHandle, FixtureHandle, JointHandle};
pub use body::{Body, BodyDef, BodyType, ContactEdge, JointEdge};
pub use contact::{Contact, ContactKind};
pub use fixture::{Filter, Fixture, FixtureDef, FixtureProxy};
pub use joints::{
    angular_stiffness, linear_stiffness, DistanceJoint, DistanceJointDef, FrictionJoint, FrictionJointDef,
    GearJoint, GearJointDef, Joint, JointBase, JointDef, JointKind, JointType, MotorJoint, MotorJointDef,
    MouseJoint, MouseJointDef, PrismaticJoint, PrismaticJointDef, PulleyJoint, PulleyJointDef, RevoluteJoint,
    RevoluteJointDef, WeldJoint, WeldJointDef, WheelJoint, WheelJointDef,
};
pub use time_step::TimeStep;
pub use world::World;
pub use world_callbacks::{ContactFilter, ContactImpulse, ContactListener, DefaultContactFilter};
