mod lockstep;
mod roundtrip;
