mod call_steps;
mod routing_steps;
mod teardown_steps;
