// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Display implementations for routing objects.

use std::fmt::{Display, Formatter, Result};

use crate::entry::{Forward, Resolution, RouteAction, RouteEntry};
use crate::fib::FibRoute;
use crate::nexthop::{NextHop, ResolvedNextHop};

impl Display for RouteAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            RouteAction::Forward => write!(f, "forward"),
            RouteAction::Drop => write!(f, "drop"),
            RouteAction::ToCpu => write!(f, "to-cpu"),
        }
    }
}

impl Display for NextHop {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "via {}", self.addr)?;
        if let Some(interface) = self.interface {
            write!(f, " dev {interface}")?;
        }
        if self.weight != 0 {
            write!(f, " weight {}", self.weight)?;
        }
        if let Some(labels) = &self.labels {
            write!(f, " labels")?;
            for label in labels {
                write!(f, " {}", label.as_u32())?;
            }
        }
        Ok(())
    }
}

impl Display for ResolvedNextHop {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "via {} dev {}", self.addr, self.interface)?;
        if self.weight != 0 {
            write!(f, " weight {}", self.weight)?;
        }
        if let Some(labels) = &self.labels {
            write!(f, " labels")?;
            for label in labels {
                write!(f, " {}", label.as_u32())?;
            }
        }
        Ok(())
    }
}

impl Display for Forward {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            Forward::Drop => write!(f, "drop"),
            Forward::ToCpu => write!(f, "to-cpu"),
            Forward::Nexthops(set) => {
                for (i, nhop) in set.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{nhop}")?;
                }
                Ok(())
            }
        }
    }
}

impl Display for Resolution {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            Resolution::Pending => write!(f, "pending"),
            Resolution::Resolving => write!(f, "resolving"),
            Resolution::Resolved(fwd) => write!(f, "{fwd}"),
            Resolution::Unresolved => write!(f, "unresolved"),
        }
    }
}

impl Display for RouteEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{}", self.prefix())?;
        if self.is_connected() {
            write!(f, " (connected)")?;
        }
        writeln!(f, " [{}]", self.resolution())?;
        for (client, entry) in self.candidates() {
            write!(
                f,
                "  {client} ad {} {}",
                entry.distance(),
                entry.action()
            )?;
            for nhop in entry.nhops().iter() {
                write!(f, " {nhop}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

impl Display for FibRoute {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            FibRoute::Drop => write!(f, "drop"),
            FibRoute::ToCpu => write!(f, "to-cpu"),
            FibRoute::Single(nhop) => write!(f, "{nhop}"),
            FibRoute::Ecmp(group) => {
                write!(f, "ecmp group {} (", group.id())?;
                for (i, nhop) in group.nhops().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{nhop}")?;
                }
                write!(f, ")")
            }
        }
    }
}
